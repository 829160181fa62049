//! Mapping of raw SDK events into the controller's closed event set.
//!
//! The SDK publishes loosely-typed payloads keyed by an event name. Only the
//! fields read here are relied on; everything else is ignored.
//!
//! | SDK event | Payload | Maps to |
//! |-----------|---------|---------|
//! | `call-start` | optional `call.id` / `id` | `CallStarted` |
//! | `call-end` | - | `CallEnded` |
//! | `speech-start` / `speech-end` | - | `SpeechStarted` / `SpeechEnded` |
//! | `message` `type=call-start` | `call.id` | `CallStarted` with id |
//! | `message` `type=transcript`, `user-started-speaking`, `user-stopped-speaking` | - | `ActivityMessage` |
//! | `error` | string or `{message}` / `{error}` | `SdkError` |

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message types that count as conversational activity
const ACTIVITY_MESSAGE_TYPES: &[&str] = &[
    "transcript",
    "user-started-speaking",
    "user-stopped-speaking",
];

/// Error texts the platform uses when it ends a call on purpose
const EXPECTED_HANGUP_MARKERS: &[&str] = &[
    "meeting has ended",
    "meeting ended",
    "ejected",
    "max-duration",
    "max duration",
    "exceeded-max-duration",
    "call has ended",
    "call ended",
];

/// Event as published by the SDK
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdkEvent {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

impl SdkEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Event without a payload
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }
}

/// Events the controller reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    /// The call is live; the id may arrive now or in a later `CallStarted`
    CallStarted { call_id: Option<String> },
    CallEnded,
    SpeechStarted,
    SpeechEnded,
    /// Transcript or user speech notification
    ActivityMessage,
    SdkError {
        message: String,
        /// Platform-initiated hangup rather than a failure
        expected: bool,
    },
}

impl VoiceEvent {
    /// Map an SDK event, returning `None` for events the controller ignores
    pub fn from_sdk(event: &SdkEvent) -> Option<Self> {
        match event.name.as_str() {
            "call-start" => Some(VoiceEvent::CallStarted {
                call_id: call_id_of(&event.payload),
            }),
            "call-end" => Some(VoiceEvent::CallEnded),
            "speech-start" => Some(VoiceEvent::SpeechStarted),
            "speech-end" => Some(VoiceEvent::SpeechEnded),
            "message" => from_message(&event.payload),
            "error" => {
                let message = error_text(&event.payload);
                let expected = is_expected_hangup(&message);
                Some(VoiceEvent::SdkError { message, expected })
            }
            other => {
                tracing::trace!(event = %other, "Ignoring unknown SDK event");
                None
            }
        }
    }
}

fn from_message(payload: &Value) -> Option<VoiceEvent> {
    let kind = payload.get("type").and_then(Value::as_str)?;

    if kind == "call-start" {
        return call_id_of(payload).map(|id| VoiceEvent::CallStarted { call_id: Some(id) });
    }
    if ACTIVITY_MESSAGE_TYPES.contains(&kind) {
        return Some(VoiceEvent::ActivityMessage);
    }
    None
}

fn call_id_of(payload: &Value) -> Option<String> {
    payload
        .pointer("/call/id")
        .or_else(|| payload.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn error_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Null => "unknown error".to_string(),
        other => other
            .get("message")
            .or_else(|| other.get("errorMsg"))
            .or_else(|| other.pointer("/error/message"))
            .or_else(|| other.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

/// Whether an SDK error text describes a normal platform hangup
pub fn is_expected_hangup(message: &str) -> bool {
    let lower = message.to_lowercase();
    EXPECTED_HANGUP_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lifecycle_events() {
        assert_eq!(
            VoiceEvent::from_sdk(&SdkEvent::bare("call-start")),
            Some(VoiceEvent::CallStarted { call_id: None })
        );
        assert_eq!(
            VoiceEvent::from_sdk(&SdkEvent::new("call-start", json!({ "call": { "id": "c-1" } }))),
            Some(VoiceEvent::CallStarted {
                call_id: Some("c-1".to_string())
            })
        );
        assert_eq!(
            VoiceEvent::from_sdk(&SdkEvent::bare("call-end")),
            Some(VoiceEvent::CallEnded)
        );
        assert_eq!(
            VoiceEvent::from_sdk(&SdkEvent::bare("speech-start")),
            Some(VoiceEvent::SpeechStarted)
        );
        assert_eq!(
            VoiceEvent::from_sdk(&SdkEvent::bare("speech-end")),
            Some(VoiceEvent::SpeechEnded)
        );
    }

    #[test]
    fn test_message_events() {
        let call_start = SdkEvent::new(
            "message",
            json!({ "type": "call-start", "call": { "id": "abc" } }),
        );
        assert_eq!(
            VoiceEvent::from_sdk(&call_start),
            Some(VoiceEvent::CallStarted {
                call_id: Some("abc".to_string())
            })
        );

        let transcript = SdkEvent::new(
            "message",
            json!({ "type": "transcript", "role": "user", "transcript": "hi" }),
        );
        assert_eq!(
            VoiceEvent::from_sdk(&transcript),
            Some(VoiceEvent::ActivityMessage)
        );

        let other = SdkEvent::new("message", json!({ "type": "function-call" }));
        assert_eq!(VoiceEvent::from_sdk(&other), None);

        // A call-start message without an id carries nothing new
        let no_id = SdkEvent::new("message", json!({ "type": "call-start" }));
        assert_eq!(VoiceEvent::from_sdk(&no_id), None);
    }

    #[test]
    fn test_error_classification() {
        let hangup = SdkEvent::new("error", json!({ "message": "Meeting has ended" }));
        assert_eq!(
            VoiceEvent::from_sdk(&hangup),
            Some(VoiceEvent::SdkError {
                message: "Meeting has ended".to_string(),
                expected: true
            })
        );

        let failure = SdkEvent::new("error", json!("ICE connection failed"));
        assert_eq!(
            VoiceEvent::from_sdk(&failure),
            Some(VoiceEvent::SdkError {
                message: "ICE connection failed".to_string(),
                expected: false
            })
        );

        let nested = SdkEvent::new(
            "error",
            json!({ "error": { "message": "exceeded-max-duration" } }),
        );
        assert!(matches!(
            VoiceEvent::from_sdk(&nested),
            Some(VoiceEvent::SdkError { expected: true, .. })
        ));
    }

    #[test]
    fn test_unknown_event_ignored() {
        assert_eq!(VoiceEvent::from_sdk(&SdkEvent::bare("volume-level")), None);
    }
}
