//! Core domain types for voicedemo
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One demo call attempt, from the start click to a terminal status |
//! | **Cap** | Hard limit on call length, in seconds |
//! | **Closing notice** | Scripted message asking the agent to wrap up before the cap |
//! | **Cooldown** | Minimum wait between the end of one call and the next start |
//! | **Activity** | Any speech or transcript seen on the call |

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================
// Session status
// ============================================

/// Lifecycle of a single demo call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// No call in progress
    #[default]
    Idle,
    /// Start requested, waiting for the SDK to report the call is up
    Connecting,
    /// Call is live; countdown and inactivity monitor are running
    Connected,
    /// Call finished normally (user, cap, inactivity, remote hangup)
    Ended,
    /// Call could not start or failed unexpectedly
    Errored,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Idle => "idle",
            CallStatus::Connecting => "connecting",
            CallStatus::Connected => "connected",
            CallStatus::Ended => "ended",
            CallStatus::Errored => "errored",
        }
    }

    /// Connecting or Connected
    pub fn is_active(&self) -> bool {
        matches!(self, CallStatus::Connecting | CallStatus::Connected)
    }

    /// Ended or Errored
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Ended | CallStatus::Errored)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// Termination
// ============================================

/// Why a session left the Connecting/Connected states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The visitor pressed "End Call"
    UserEnded,
    /// The countdown reached zero
    CountdownExpired,
    /// Nobody spoke for the configured timeout
    Inactivity,
    /// The remote side hung up (call-end or an expected platform error)
    RemoteHangup,
    /// The SDK reported a genuine failure
    SdkFailure,
    /// The controller was torn down with a call in flight
    Disposed,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::UserEnded => "user_ended",
            TerminationReason::CountdownExpired => "countdown_expired",
            TerminationReason::Inactivity => "inactivity",
            TerminationReason::RemoteHangup => "remote_hangup",
            TerminationReason::SdkFailure => "sdk_failure",
            TerminationReason::Disposed => "disposed",
        }
    }

    /// Whether the controller asks the SDK to stop.
    ///
    /// Only a remote hangup skips `stop()`; a genuine SDK failure still
    /// releases local resources.
    pub fn is_local(&self) -> bool {
        !matches!(self, TerminationReason::RemoteHangup)
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// User-facing errors
// ============================================

/// Category of a user-visible connection problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Cooldown still active
    Admission,
    /// Required audio APIs are missing on this platform
    Capability,
    /// Microphone access was denied
    Permission,
    /// Credential fetch or SDK construction failed
    Initialization,
    /// Any other SDK-reported error
    UnexpectedSdk,
}

/// Error surfaced to the UI in place of an exception
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ConnectionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether the UI should offer a retry button.
    ///
    /// Unsupported platforms cannot recover by retrying.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, ErrorKind::Capability)
    }
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

// ============================================
// View
// ============================================

/// Snapshot of everything the call widget renders
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionView {
    pub status: CallStatus,
    /// Set once the SDK reports the call id
    pub call_id: Option<String>,
    /// Seconds left before the cap ends the call
    pub seconds_remaining: u32,
    /// `seconds_remaining` as `M:SS`
    pub countdown_text: String,
    /// The assistant is currently speaking
    pub is_speaking: bool,
    /// Silence is about to end the call
    pub inactivity_warning: bool,
    /// The closing notice went out for this session
    pub closing_notice_sent: bool,
    pub connection_error: Option<ConnectionError>,
    /// Wait before another call may start
    pub cooldown_remaining: Option<Duration>,
    /// `cooldown_remaining` as a sentence
    pub cooldown_text: Option<String>,
    pub last_termination: Option<TerminationReason>,
}

impl SessionView {
    pub fn is_connected(&self) -> bool {
        self.status == CallStatus::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.status == CallStatus::Connecting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_predicates() {
        assert!(CallStatus::Connecting.is_active());
        assert!(CallStatus::Connected.is_active());
        assert!(!CallStatus::Idle.is_active());
        assert!(CallStatus::Ended.is_terminal());
        assert!(CallStatus::Errored.is_terminal());
        assert!(!CallStatus::Connected.is_terminal());
    }

    #[test]
    fn test_termination_locality() {
        assert!(TerminationReason::CountdownExpired.is_local());
        assert!(TerminationReason::Inactivity.is_local());
        assert!(TerminationReason::UserEnded.is_local());
        assert!(!TerminationReason::RemoteHangup.is_local());
        assert!(TerminationReason::SdkFailure.is_local());
        assert!(TerminationReason::Disposed.is_local());
    }

    #[test]
    fn test_retry_affordance() {
        assert!(ConnectionError::new(ErrorKind::Permission, "denied").is_retryable());
        assert!(ConnectionError::new(ErrorKind::Initialization, "down").is_retryable());
        assert!(!ConnectionError::new(ErrorKind::Capability, "no webrtc").is_retryable());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&CallStatus::Connecting).unwrap();
        assert_eq!(json, "\"connecting\"");
        let json = serde_json::to_string(&TerminationReason::CountdownExpired).unwrap();
        assert_eq!(json, "\"countdown_expired\"");
    }
}
