//! Async driver for [`CallSessionController`].
//!
//! The runtime owns the controller on a single tokio task, so SDK events,
//! timer ticks and user commands are applied one at a time. Callers talk to
//! it through a cloneable [`SessionHandle`] and watch [`SessionView`]
//! snapshots published after every step.
//!
//! A runtime spawned with an [`Initializer`] starts without a voice client.
//! [`SessionHandle::initialize`] fetches the credential and builds one; a
//! failure stays in the view as an initialization error until the next
//! successful attempt.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use super::controller::{CallSessionController, StartError};
use crate::config::Config;
use crate::credentials::{self, CredentialProvider, RetryPolicy};
use crate::types::SessionView;
use crate::voice::{SdkEvent, VoiceClientFactory, VoiceEvent};

const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);
const COMMAND_BUFFER: usize = 16;

/// Timer periods for the driver loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub inactivity_poll: Duration,
    pub cooldown_refresh: Duration,
}

impl RuntimeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            inactivity_poll: Duration::from_millis(config.call.inactivity_poll_ms),
            cooldown_refresh: config.cooldown.refresh_interval(),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything needed to (re)build the voice client inside the session task
pub struct Initializer {
    pub provider: CredentialProvider,
    pub factory: Box<dyn VoiceClientFactory>,
    pub policy: RetryPolicy,
}

impl std::fmt::Debug for Initializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initializer")
            .field("provider", &self.provider)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

enum Command {
    Initialize {
        reply: oneshot::Sender<Result<(), StartError>>,
    },
    StartCall {
        assistant_id: String,
        reply: oneshot::Sender<Result<(), StartError>>,
    },
    EndCall,
    Dispose {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running session task
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    /// Build the voice client, retrying transient failures.
    ///
    /// Calling it again after a failure is the manual retry. Once a client
    /// is attached this returns `Ok` without doing anything.
    pub async fn initialize(&self) -> Result<(), StartError> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Initialize { reply }).await.is_err() {
            return Err(StartError::Disposed);
        }
        rx.await.unwrap_or(Err(StartError::Disposed))
    }

    /// Start a call and wait for the admission result
    pub async fn start_call(&self, assistant_id: impl Into<String>) -> Result<(), StartError> {
        let (reply, rx) = oneshot::channel();
        let command = Command::StartCall {
            assistant_id: assistant_id.into(),
            reply,
        };
        if self.commands.send(command).await.is_err() {
            return Err(StartError::Disposed);
        }
        rx.await.unwrap_or(Err(StartError::Disposed))
    }

    /// Hang up; ignored unless a call is connected
    pub async fn end_call(&self) {
        let _ = self.commands.send(Command::EndCall).await;
    }

    /// Stop the session task, ending any call in flight
    pub async fn dispose(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Dispose { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Latest published snapshot
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("status", &self.view.borrow().status)
            .finish_non_exhaustive()
    }
}

/// The session task
pub struct SessionRuntime {
    controller: CallSessionController,
    events: Option<mpsc::UnboundedReceiver<SdkEvent>>,
    initializer: Option<Initializer>,
    commands: mpsc::Receiver<Command>,
    view_tx: watch::Sender<SessionView>,
    settings: RuntimeSettings,
    countdown: Option<Interval>,
    inactivity: Option<Interval>,
    armed_generation: Option<u64>,
}

impl SessionRuntime {
    /// Spawn the session task on the current tokio runtime
    pub fn spawn(
        controller: CallSessionController,
        events: mpsc::UnboundedReceiver<SdkEvent>,
        settings: RuntimeSettings,
    ) -> SessionHandle {
        Self::launch(controller, Some(events), None, settings)
    }

    /// Spawn a session whose voice client is built by [`SessionHandle::initialize`]
    pub fn spawn_with_initializer(
        controller: CallSessionController,
        initializer: Initializer,
        settings: RuntimeSettings,
    ) -> SessionHandle {
        Self::launch(controller, None, Some(initializer), settings)
    }

    fn launch(
        controller: CallSessionController,
        events: Option<mpsc::UnboundedReceiver<SdkEvent>>,
        initializer: Option<Initializer>,
        settings: RuntimeSettings,
    ) -> SessionHandle {
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (view_tx, view) = watch::channel(controller.view());

        let runtime = SessionRuntime {
            controller,
            events,
            initializer,
            commands,
            view_tx,
            settings,
            countdown: None,
            inactivity: None,
            armed_generation: None,
        };
        tokio::spawn(runtime.run());

        SessionHandle {
            commands: command_tx,
            view,
        }
    }

    async fn run(mut self) {
        let refresh_period = self.settings.cooldown_refresh;
        let mut refresh = interval_at(Instant::now() + refresh_period, refresh_period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.sync_timers();

            tokio::select! {
                biased;
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("All session handles dropped");
                        break;
                    };
                    if self.handle_command(command).await {
                        return;
                    }
                }
                event = next_event(&mut self.events) => {
                    self.handle_sdk_event(event);
                }
                _ = tick(&mut self.countdown) => {
                    self.controller.countdown_tick();
                }
                _ = tick(&mut self.inactivity) => {
                    self.controller.check_inactivity();
                }
                _ = refresh.tick() => {
                    self.controller.refresh_cooldown();
                }
            }

            self.publish();
        }

        self.controller.dispose();
        self.publish();
    }

    /// Returns true when the task should exit
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Initialize { reply } => {
                let result = self.initialize().await;
                let _ = reply.send(result);
                false
            }
            Command::StartCall {
                assistant_id,
                reply,
            } => {
                let result = self.controller.start_call(&assistant_id);
                let _ = reply.send(result);
                false
            }
            Command::EndCall => {
                self.controller.end_call();
                false
            }
            Command::Dispose { reply } => {
                self.controller.dispose();
                self.disarm();
                self.publish();
                let _ = reply.send(());
                true
            }
        }
    }

    /// Commands queue until this returns
    async fn initialize(&mut self) -> Result<(), StartError> {
        if self.controller.is_disposed() {
            return Err(StartError::Disposed);
        }
        if !self.controller.needs_voice() {
            return Ok(());
        }
        let Some(init) = self.initializer.as_ref() else {
            return Err(StartError::Failed(self.controller.record_init_failure(
                &crate::Error::Config("no voice initializer configured".to_string()),
            )));
        };

        match credentials::initialize(&init.provider, init.factory.as_ref(), &init.policy).await {
            Ok(connection) => {
                self.controller.attach_voice(connection.client);
                self.events = Some(connection.events);
                Ok(())
            }
            Err(e) => Err(StartError::Failed(self.controller.record_init_failure(&e))),
        }
    }

    fn handle_sdk_event(&mut self, event: Option<SdkEvent>) {
        match event {
            Some(event) => {
                if let Some(event) = VoiceEvent::from_sdk(&event) {
                    self.controller.handle_event(event);
                }
            }
            None => {
                tracing::warn!("Voice event stream closed");
                self.events = None;
                if self.controller.status().is_active() {
                    self.controller.handle_event(VoiceEvent::CallEnded);
                }
            }
        }
    }

    /// Arm fresh intervals on each new timer generation, drop them otherwise
    fn sync_timers(&mut self) {
        let wanted = self.controller.timers_armed();
        if wanted == self.armed_generation {
            return;
        }
        self.armed_generation = wanted;
        if wanted.is_none() {
            self.disarm();
            return;
        }

        let now = Instant::now();
        self.countdown = Some(interval_at(now + COUNTDOWN_PERIOD, COUNTDOWN_PERIOD));

        let poll = self.settings.inactivity_poll;
        let mut inactivity = interval_at(now + poll, poll);
        inactivity.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.inactivity = Some(inactivity);
    }

    fn disarm(&mut self) {
        self.countdown = None;
        self.inactivity = None;
        self.armed_generation = None;
    }

    fn publish(&self) {
        let view = self.controller.view();
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<SdkEvent>>) -> Option<SdkEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
