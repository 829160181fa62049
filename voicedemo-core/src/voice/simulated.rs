//! Scripted stand-in for the voice SDK.
//!
//! Emits the same event sequence a real call produces: `call-start` after a
//! connect delay, alternating agent speech and user transcripts, and
//! `call-end` on stop. The simulated server also enforces the requested
//! max duration by ending the meeting, which surfaces as an expected-hangup
//! error just like the hosted platform.

use super::{OutboundMessage, SdkEvent, StartOptions, VoiceClient, VoiceClientFactory, VoiceConnection};
use crate::error::{Error, Result};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Grace the simulated server allows past the requested cap
const SERVER_CAP_GRACE: Duration = Duration::from_secs(2);

/// Timing of the scripted conversation
#[derive(Debug, Clone)]
pub struct SimulationScript {
    /// Delay between `start` and `call-start`
    pub connect_delay: Duration,
    /// Length of one conversational turn
    pub turn_length: Duration,
    /// Stop producing speech after this long into the call
    pub silent_after: Option<Duration>,
}

impl Default for SimulationScript {
    fn default() -> Self {
        Self {
            connect_delay: Duration::from_millis(300),
            turn_length: Duration::from_secs(3),
            silent_after: None,
        }
    }
}

/// Simulated SDK instance
pub struct SimulatedVoiceClient {
    script: SimulationScript,
    events: mpsc::UnboundedSender<SdkEvent>,
    conversation: Option<JoinHandle<()>>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl SimulatedVoiceClient {
    pub fn new(script: SimulationScript) -> (Self, mpsc::UnboundedReceiver<SdkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Self {
            script,
            events: tx,
            conversation: None,
            sent: Arc::new(Mutex::new(Vec::new())),
        };
        (client, rx)
    }

    /// Messages the controller sent to the agent
    pub fn sent_messages(&self) -> Arc<Mutex<Vec<OutboundMessage>>> {
        Arc::clone(&self.sent)
    }
}

impl VoiceClient for SimulatedVoiceClient {
    fn start(&mut self, assistant_id: &str, options: &StartOptions) -> Result<()> {
        if assistant_id.trim().is_empty() {
            return Err(Error::Voice("assistant id is required".to_string()));
        }
        if self.conversation.is_some() {
            return Err(Error::Voice("a call is already in progress".to_string()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Voice(format!("no async runtime: {}", e)))?;

        let call_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(
            assistant_id = %assistant_id,
            call_id = %call_id,
            max_duration_seconds = options.max_duration_seconds,
            "Simulated call starting"
        );

        let task = runtime.spawn(run_conversation(
            self.script.clone(),
            call_id,
            Duration::from_secs(u64::from(options.max_duration_seconds)),
            self.events.clone(),
        ));
        self.conversation = Some(task);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.conversation.take() {
            task.abort();
            let _ = self.events.send(SdkEvent::bare("call-end"));
        }
        Ok(())
    }

    fn send(&mut self, message: &OutboundMessage) -> Result<()> {
        if self.conversation.is_none() {
            return Err(Error::Voice("no call in progress".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());

        // The agent reads the injected line out loud
        let _ = self.events.send(SdkEvent::new(
            "message",
            json!({
                "type": "transcript",
                "role": "assistant",
                "transcript": message.message.content,
            }),
        ));
        Ok(())
    }
}

impl Drop for SimulatedVoiceClient {
    fn drop(&mut self) {
        if let Some(task) = self.conversation.take() {
            task.abort();
        }
    }
}

async fn run_conversation(
    script: SimulationScript,
    call_id: String,
    server_cap: Duration,
    events: mpsc::UnboundedSender<SdkEvent>,
) {
    tokio::time::sleep(script.connect_delay).await;

    let started = tokio::time::Instant::now();
    let hard_stop = started + server_cap + SERVER_CAP_GRACE;

    if events
        .send(SdkEvent::new("call-start", json!({ "call": { "id": call_id } })))
        .is_err()
    {
        return;
    }

    let mut agent_turn = true;
    loop {
        let next_turn = tokio::time::Instant::now() + script.turn_length;
        if next_turn >= hard_stop {
            tokio::time::sleep_until(hard_stop).await;
            let _ = events.send(SdkEvent::new(
                "error",
                json!({ "message": "Meeting has ended" }),
            ));
            let _ = events.send(SdkEvent::bare("call-end"));
            return;
        }

        let silent = script
            .silent_after
            .is_some_and(|after| started.elapsed() >= after);
        if !silent {
            let sent = if agent_turn {
                events.send(SdkEvent::bare("speech-start")).is_ok()
            } else {
                events
                    .send(SdkEvent::new(
                        "message",
                        json!({ "type": "user-started-speaking" }),
                    ))
                    .is_ok()
            };
            if !sent {
                return;
            }
        }

        tokio::time::sleep_until(next_turn).await;

        if !silent {
            let event = if agent_turn {
                SdkEvent::bare("speech-end")
            } else {
                SdkEvent::new(
                    "message",
                    json!({ "type": "transcript", "role": "user", "transcript": "..." }),
                )
            };
            if events.send(event).is_err() {
                return;
            }
        }
        agent_turn = !agent_turn;
    }
}

/// Factory producing simulated clients
///
/// Can be told to fail the first few connects, to exercise initialization
/// retries.
#[derive(Debug, Default)]
pub struct SimulatedVoiceFactory {
    script: SimulationScript,
    failures_left: AtomicU32,
}

impl SimulatedVoiceFactory {
    pub fn new(script: SimulationScript) -> Self {
        Self {
            script,
            failures_left: AtomicU32::new(0),
        }
    }

    pub fn failing_first(mut self, attempts: u32) -> Self {
        self.failures_left = AtomicU32::new(attempts);
        self
    }
}

impl VoiceClientFactory for SimulatedVoiceFactory {
    fn connect(&self, api_key: &str) -> Result<VoiceConnection> {
        if api_key.trim().is_empty() {
            return Err(Error::Voice("empty api key".to_string()));
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Voice("voice service unreachable".to_string()));
        }

        let (client, events) = SimulatedVoiceClient::new(self.script.clone());
        Ok(VoiceConnection {
            client: Box::new(client),
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::VoiceEvent;

    fn options(secs: u32) -> StartOptions {
        StartOptions {
            max_duration_seconds: secs,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_start_after_connect_delay() {
        let (mut client, mut rx) = SimulatedVoiceClient::new(SimulationScript::default());
        client.start("asst", &options(60)).unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            VoiceEvent::from_sdk(&first),
            Some(VoiceEvent::CallStarted { call_id: Some(_) })
        ));

        client.stop().unwrap();
        // Drain until call-end
        loop {
            let event = rx.recv().await.unwrap();
            if event.name == "call-end" {
                break;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_cap_ends_meeting() {
        let script = SimulationScript {
            silent_after: Some(Duration::ZERO),
            ..Default::default()
        };
        let (mut client, mut rx) = SimulatedVoiceClient::new(script);
        client.start("asst", &options(5)).unwrap();

        let mut names = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = event.name == "call-end";
            names.push(event);
            if done {
                break;
            }
        }

        let error = names
            .iter()
            .find(|e| e.name == "error")
            .expect("server should end the meeting");
        assert!(matches!(
            VoiceEvent::from_sdk(error),
            Some(VoiceEvent::SdkError { expected: true, .. })
        ));
        // Silent from the start: no speech events at all
        assert!(!names.iter().any(|e| e.name == "speech-start"));
    }

    #[tokio::test]
    async fn test_send_requires_call() {
        let (mut client, _rx) = SimulatedVoiceClient::new(SimulationScript::default());
        assert!(client
            .send(&OutboundMessage::closing_notice("bye"))
            .is_err());
        assert!(client.start("", &options(60)).is_err());
        // Stop without a call is a no-op
        assert!(client.stop().is_ok());
    }

    #[test]
    fn test_factory_failures() {
        let factory = SimulatedVoiceFactory::default().failing_first(2);
        assert!(factory.connect("key").is_err());
        assert!(factory.connect("key").is_err());
        assert!(factory.connect("key").is_ok());
        assert!(factory.connect("").is_err());
    }
}
