//! Voice SDK boundary
//!
//! The voice provider is an external collaborator. The controller only needs
//! to start, stop and message a call, and to receive its events:
//!
//! ```text
//! ┌──────────────┐  start/stop/send  ┌──────────────┐
//! │  Controller  │ ────────────────► │ VoiceClient  │
//! │              │ ◄──────────────── │  (SDK)       │
//! └──────────────┘    VoiceEvent     └──────────────┘
//!                 (mapped from SdkEvent)
//! ```
//!
//! Raw SDK payloads are mapped into [`VoiceEvent`] in [`events`] before any
//! controller logic sees them.

pub mod events;
pub mod simulated;

pub use events::{SdkEvent, VoiceEvent};

use crate::error::Result;
use serde::Serialize;
use tokio::sync::mpsc;

/// Options passed with a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    /// Server-side cap, matching the local countdown
    pub max_duration_seconds: u32,
}

/// Message sent to the agent during a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: InjectedMessage,
}

/// Payload of an `add-message` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectedMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub delay_seconds: u32,
}

impl OutboundMessage {
    /// Ask the agent to say `content` right away
    pub fn closing_notice(content: impl Into<String>) -> Self {
        Self {
            kind: "add-message".to_string(),
            message: InjectedMessage {
                kind: "request-response-delayed".to_string(),
                content: content.into(),
                delay_seconds: 0,
            },
        }
    }
}

/// Control surface of a voice SDK instance
pub trait VoiceClient: Send {
    /// Begin connecting; `call-start` arrives on the event stream once live
    fn start(&mut self, assistant_id: &str, options: &StartOptions) -> Result<()>;

    /// Hang up and release audio resources
    fn stop(&mut self) -> Result<()>;

    /// Send a control message to the agent
    fn send(&mut self, message: &OutboundMessage) -> Result<()>;
}

/// A constructed client plus its event subscription
pub struct VoiceConnection {
    pub client: Box<dyn VoiceClient>,
    pub events: mpsc::UnboundedReceiver<SdkEvent>,
}

impl std::fmt::Debug for VoiceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceConnection").finish_non_exhaustive()
    }
}

/// Builds a client from a credential
pub trait VoiceClientFactory: Send + Sync {
    fn connect(&self, api_key: &str) -> Result<VoiceConnection>;
}
