//! Call session controller
//!
//! Owns one demo call at a time and drives it through
//! `Idle → Connecting → Connected → Ended | Errored`.
//!
//! The controller is synchronous. Something else (see
//! [`runtime`](super::runtime)) feeds it SDK events and calls
//! [`countdown_tick`](CallSessionController::countdown_tick) once per second
//! and [`check_inactivity`](CallSessionController::check_inactivity) several
//! times per second while [`timers_armed`](CallSessionController::timers_armed)
//! reports a generation.
//!
//! ## Termination
//!
//! The countdown, the inactivity monitor, the user and the SDK can all end a
//! session, sometimes within the same tick. Every path goes through
//! `finish`, which is one-shot per session: it disarms the timers, clears the
//! call id and writes the cooldown record before the SDK is asked to stop, so
//! nothing fires after a terminal status and `stop()` runs at most once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::audio::{AudioAccess, AudioGate};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::cooldown::{CooldownActive, CooldownStore};
use crate::error::Error;
use crate::format::{cooldown_message, format_countdown};
use crate::types::{CallStatus, ConnectionError, ErrorKind, SessionView, TerminationReason};
use crate::voice::{OutboundMessage, StartOptions, VoiceClient, VoiceEvent};

const PERMISSION_DENIED_MESSAGE: &str =
    "Microphone access was denied. Allow microphone access and try again.";
const INIT_FAILED_MESSAGE: &str = "Could not connect to the voice service. Please try again.";
const SDK_FAILURE_MESSAGE: &str = "The call was interrupted. Please try again.";

/// Limits applied to every session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Call cap in seconds, also sent to the server
    pub max_duration_secs: u32,
    /// Remaining seconds at which the closing notice is sent; `None` disables it
    pub warning_at_secs: Option<u32>,
    pub warning_message: String,
    pub inactivity_timeout: Duration,
    /// How long before the inactivity cutoff the UI starts warning
    pub inactivity_warning_lead: Duration,
    pub cooldown_period: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        let call = &config.call;
        Self {
            max_duration_secs: call.max_duration_secs,
            warning_at_secs: call.warning_enabled.then_some(call.warning_at_secs),
            warning_message: call.warning_message.clone(),
            inactivity_timeout: Duration::from_secs(u64::from(call.inactivity_timeout_secs)),
            inactivity_warning_lead: Duration::from_secs(u64::from(
                call.inactivity_warning_lead_secs,
            )),
            cooldown_period: config.cooldown.period(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Why `start_call` did not begin connecting
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Cooldown(#[from] CooldownActive),

    #[error("a call is already {0}")]
    AlreadyActive(CallStatus),

    #[error("controller has been disposed")]
    Disposed,

    /// Capability, permission or initialization failure; also shown in the view
    #[error("{0}")]
    Failed(ConnectionError),
}

/// The transient per-call state
#[derive(Debug, Clone)]
struct CallSession {
    status: CallStatus,
    call_id: Option<String>,
    seconds_remaining: u32,
    last_activity_at: DateTime<Utc>,
    warning_issued: bool,
    is_speaking: bool,
    inactivity_warning: bool,
    /// One-shot guard for `finish`
    terminating: bool,
    /// Generation of the armed countdown/inactivity timers
    timers: Option<u64>,
}

impl CallSession {
    fn new(status: CallStatus, now: DateTime<Utc>, cap: u32) -> Self {
        Self {
            status,
            call_id: None,
            seconds_remaining: cap,
            last_activity_at: now,
            warning_issued: false,
            is_speaking: false,
            inactivity_warning: false,
            terminating: false,
            timers: None,
        }
    }
}

/// Orchestrates a single demo voice call end-to-end
pub struct CallSessionController {
    settings: SessionSettings,
    /// `None` until initialization attaches a client
    voice: Option<Box<dyn VoiceClient>>,
    store: Box<dyn CooldownStore>,
    audio: Box<dyn AudioGate>,
    clock: Arc<dyn Clock>,
    session: CallSession,
    connection_error: Option<ConnectionError>,
    cooldown_remaining: Option<Duration>,
    last_termination: Option<TerminationReason>,
    timer_generation: u64,
    disposed: bool,
}

impl CallSessionController {
    pub fn new(
        settings: SessionSettings,
        voice: Box<dyn VoiceClient>,
        store: Box<dyn CooldownStore>,
        audio: Box<dyn AudioGate>,
    ) -> Self {
        Self::with_clock(settings, voice, store, audio, Arc::new(SystemClock))
    }

    /// A controller that has no voice client yet.
    ///
    /// Starts are refused with an initialization error until
    /// [`attach_voice`](Self::attach_voice) supplies one.
    pub fn uninitialized(
        settings: SessionSettings,
        store: Box<dyn CooldownStore>,
        audio: Box<dyn AudioGate>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::build(settings, None, store, audio, clock)
    }

    pub fn with_clock(
        settings: SessionSettings,
        voice: Box<dyn VoiceClient>,
        store: Box<dyn CooldownStore>,
        audio: Box<dyn AudioGate>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::build(settings, Some(voice), store, audio, clock)
    }

    fn build(
        settings: SessionSettings,
        voice: Option<Box<dyn VoiceClient>>,
        store: Box<dyn CooldownStore>,
        audio: Box<dyn AudioGate>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        let session = CallSession::new(CallStatus::Idle, now, settings.max_duration_secs);
        let mut controller = Self {
            settings,
            voice,
            store,
            audio,
            clock,
            session,
            connection_error: None,
            cooldown_remaining: None,
            last_termination: None,
            timer_generation: 0,
            disposed: false,
        };
        controller.refresh_cooldown();
        controller
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn status(&self) -> CallStatus {
        self.session.status
    }

    pub fn call_id(&self) -> Option<&str> {
        self.session.call_id.as_deref()
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.session.seconds_remaining
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Whether a voice client still has to be attached
    pub fn needs_voice(&self) -> bool {
        self.voice.is_none()
    }

    /// Install the client produced by initialization.
    ///
    /// A standing initialization error is cleared and the session returns to
    /// Idle, so the next start goes through.
    pub fn attach_voice(&mut self, voice: Box<dyn VoiceClient>) {
        self.voice = Some(voice);
        if matches!(&self.connection_error, Some(e) if e.kind == ErrorKind::Initialization)
            && self.session.status.is_terminal()
        {
            self.reset();
        }
        tracing::debug!("Voice client attached");
    }

    /// Show a failed initialization in the view; a session in flight is left alone
    pub fn record_init_failure(&mut self, error: &Error) -> ConnectionError {
        let failure = ConnectionError::new(ErrorKind::Initialization, INIT_FAILED_MESSAGE);
        if self.session.status.is_active() {
            tracing::warn!(error = %error, "Initialization failed during an active call");
            return failure;
        }
        tracing::error!(error = %error, "Voice initialization failed");
        self.set_errored(failure.clone());
        failure
    }

    /// Generation of the running timers, `None` when they must not tick.
    ///
    /// A new generation starts on every entry into Connected.
    pub fn timers_armed(&self) -> Option<u64> {
        match self.session.status {
            CallStatus::Connected => self.session.timers,
            _ => None,
        }
    }

    /// Check the cooldown record
    pub fn can_start(&self) -> Result<(), CooldownActive> {
        match self
            .store
            .remaining(self.clock.now(), self.settings.cooldown_period)
        {
            Some(remaining) => Err(CooldownActive { remaining }),
            None => Ok(()),
        }
    }

    /// Re-read the cooldown record so the view shows a current wait
    pub fn refresh_cooldown(&mut self) -> Option<Duration> {
        self.cooldown_remaining = self
            .store
            .remaining(self.clock.now(), self.settings.cooldown_period);
        if self.cooldown_remaining.is_none()
            && matches!(&self.connection_error, Some(e) if e.kind == ErrorKind::Admission)
        {
            self.connection_error = None;
        }
        self.cooldown_remaining
    }

    /// Begin a call; must run inside the user's click handler.
    ///
    /// The microphone check is synchronous so platforms that gate audio on a
    /// user gesture still see this call as gesture-initiated.
    pub fn start_call(&mut self, assistant_id: &str) -> Result<(), StartError> {
        if self.disposed {
            return Err(StartError::Disposed);
        }
        if self.session.status.is_active() {
            return Err(StartError::AlreadyActive(self.session.status));
        }

        if let Err(cooldown) = self.can_start() {
            tracing::info!(
                remaining_ms = cooldown.remaining_millis() as u64,
                "Call refused: cooldown active"
            );
            self.cooldown_remaining = Some(cooldown.remaining);
            self.connection_error = Some(ConnectionError::new(
                ErrorKind::Admission,
                cooldown.to_string(),
            ));
            return Err(cooldown.into());
        }
        self.cooldown_remaining = None;

        match self.audio.request_access() {
            AudioAccess::Granted => {}
            AudioAccess::Denied => {
                tracing::info!("Call refused: microphone permission denied");
                return Err(self.fail_start(ConnectionError::new(
                    ErrorKind::Permission,
                    PERMISSION_DENIED_MESSAGE,
                )));
            }
            AudioAccess::Unsupported(reason) => {
                tracing::info!(reason = %reason, "Call refused: platform unsupported");
                return Err(self.fail_start(ConnectionError::new(
                    ErrorKind::Capability,
                    format!(
                        "{}. Please switch to a recent version of Chrome, Firefox, Safari or Edge.",
                        reason
                    ),
                )));
            }
        }

        if self.voice.is_none() {
            tracing::info!("Call refused: voice client not initialized");
            return Err(self.fail_start(ConnectionError::new(
                ErrorKind::Initialization,
                INIT_FAILED_MESSAGE,
            )));
        }

        let now = self.clock.now();
        self.session = CallSession::new(CallStatus::Connecting, now, self.settings.max_duration_secs);
        self.connection_error = None;
        self.last_termination = None;

        let options = StartOptions {
            max_duration_seconds: self.settings.max_duration_secs,
        };
        let started = match self.voice.as_mut() {
            Some(voice) => voice.start(assistant_id, &options),
            None => Err(Error::Voice("voice client not initialized".to_string())),
        };
        if let Err(e) = started {
            tracing::error!(error = %e, assistant_id = %assistant_id, "Voice client failed to start");
            return Err(self.fail_start(ConnectionError::new(
                ErrorKind::Initialization,
                INIT_FAILED_MESSAGE,
            )));
        }

        tracing::info!(
            assistant_id = %assistant_id,
            max_duration_secs = self.settings.max_duration_secs,
            "Call connecting"
        );
        Ok(())
    }

    fn fail_start(&mut self, error: ConnectionError) -> StartError {
        self.set_errored(error.clone());
        StartError::Failed(error)
    }

    fn set_errored(&mut self, error: ConnectionError) {
        let now = self.clock.now();
        self.session = CallSession::new(CallStatus::Errored, now, self.settings.max_duration_secs);
        self.connection_error = Some(error);
    }

    /// Apply an SDK event
    pub fn handle_event(&mut self, event: VoiceEvent) {
        let status = self.session.status;
        match event {
            VoiceEvent::CallStarted { call_id } => match status {
                CallStatus::Connecting => self.enter_connected(call_id),
                CallStatus::Connected => {
                    if self.session.call_id.is_none() {
                        if let Some(id) = call_id {
                            tracing::debug!(call_id = %id, "Call id assigned");
                            self.session.call_id = Some(id);
                        }
                    }
                }
                _ => tracing::debug!(status = %status, "Ignoring call-start outside a session"),
            },
            VoiceEvent::CallEnded => {
                if status.is_active() {
                    self.finish(TerminationReason::RemoteHangup, None);
                } else {
                    tracing::debug!(status = %status, "Ignoring call-end outside a session");
                }
            }
            VoiceEvent::SpeechStarted => {
                if self.record_activity() {
                    self.session.is_speaking = true;
                }
            }
            VoiceEvent::SpeechEnded => {
                if self.record_activity() {
                    self.session.is_speaking = false;
                }
            }
            VoiceEvent::ActivityMessage => {
                self.record_activity();
            }
            VoiceEvent::SdkError { message, expected } => {
                if !status.is_active() {
                    tracing::debug!(error = %message, status = %status, "SDK error outside a session");
                    return;
                }
                if expected {
                    tracing::info!(reason = %message, "Platform ended the call");
                    self.finish(TerminationReason::RemoteHangup, None);
                } else {
                    tracing::error!(error = %message, call_id = ?self.session.call_id, "Voice SDK error");
                    self.finish(
                        TerminationReason::SdkFailure,
                        Some(ConnectionError::new(ErrorKind::UnexpectedSdk, SDK_FAILURE_MESSAGE)),
                    );
                }
            }
        }
    }

    fn enter_connected(&mut self, call_id: Option<String>) {
        let now = self.clock.now();
        self.timer_generation += 1;

        let session = &mut self.session;
        session.status = CallStatus::Connected;
        if let Some(id) = call_id {
            session.call_id = Some(id);
        }
        session.seconds_remaining = self.settings.max_duration_secs;
        session.last_activity_at = now;
        session.warning_issued = false;
        session.inactivity_warning = false;
        session.timers = Some(self.timer_generation);

        tracing::info!(
            call_id = ?session.call_id,
            seconds_remaining = session.seconds_remaining,
            "Call connected, countdown started"
        );
    }

    /// Returns whether the activity counted (only while Connected)
    fn record_activity(&mut self) -> bool {
        if self.session.status != CallStatus::Connected {
            return false;
        }
        self.session.last_activity_at = self.clock.now();
        self.session.inactivity_warning = false;
        true
    }

    /// One countdown step; called once per second while timers are armed
    pub fn countdown_tick(&mut self) {
        if self.timers_armed().is_none() {
            return;
        }

        // Saturating, so a double-fired tick lands on zero instead of skipping it
        self.session.seconds_remaining = self.session.seconds_remaining.saturating_sub(1);
        let remaining = self.session.seconds_remaining;
        tracing::trace!(seconds_remaining = remaining, "Countdown tick");

        if remaining == 0 {
            tracing::info!(call_id = ?self.session.call_id, "Countdown reached zero");
            self.terminate(TerminationReason::CountdownExpired);
            return;
        }

        if let Some(threshold) = self.settings.warning_at_secs {
            if !self.session.warning_issued && remaining <= threshold {
                self.send_closing_notice();
            }
        }
    }

    fn send_closing_notice(&mut self) {
        self.session.warning_issued = true;
        let notice = OutboundMessage::closing_notice(self.settings.warning_message.clone());
        let Some(voice) = self.voice.as_mut() else {
            return;
        };
        match voice.send(&notice) {
            Ok(()) => tracing::info!(
                seconds_remaining = self.session.seconds_remaining,
                "Closing notice sent to agent"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to send closing notice"),
        }
    }

    /// Inactivity poll; called several times per second while timers are armed
    pub fn check_inactivity(&mut self) {
        if self.timers_armed().is_none() {
            return;
        }

        let idle = self
            .clock
            .now()
            .signed_duration_since(self.session.last_activity_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        if idle >= self.settings.inactivity_timeout {
            tracing::info!(
                idle_secs = idle.as_secs(),
                call_id = ?self.session.call_id,
                "Inactivity timeout reached"
            );
            self.terminate(TerminationReason::Inactivity);
            return;
        }

        let budget_left = self.settings.inactivity_timeout - idle;
        let warn = budget_left <= self.settings.inactivity_warning_lead;
        if warn && !self.session.inactivity_warning {
            tracing::debug!(budget_left_ms = budget_left.as_millis() as u64, "Inactivity warning");
        }
        self.session.inactivity_warning = warn;
    }

    /// User-initiated hang-up; a no-op unless Connected
    pub fn end_call(&mut self) {
        if self.session.status != CallStatus::Connected {
            tracing::debug!(status = %self.session.status, "end_call ignored");
            return;
        }
        self.terminate(TerminationReason::UserEnded);
    }

    /// Tear down: disarm timers and end any call in flight
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.session.timers = None;
        if self.session.status.is_active() {
            self.terminate(TerminationReason::Disposed);
        }
        tracing::debug!("Controller disposed");
    }

    /// Return a terminal session to Idle, clearing its error
    pub fn reset(&mut self) {
        if self.session.status.is_terminal() {
            let now = self.clock.now();
            self.session = CallSession::new(CallStatus::Idle, now, self.settings.max_duration_secs);
            self.connection_error = None;
        }
    }

    /// Locally requested termination: ends the session and stops the SDK
    fn terminate(&mut self, reason: TerminationReason) -> bool {
        self.finish(reason, None)
    }

    /// Single exit from Connecting/Connected.
    ///
    /// Returns false if the session was already finishing.
    fn finish(&mut self, reason: TerminationReason, error: Option<ConnectionError>) -> bool {
        if self.session.terminating || !self.session.status.is_active() {
            return false;
        }
        self.session.terminating = true;

        // Timers go first so no tick can observe a half-finished session
        self.session.timers = None;
        let call_id = self.session.call_id.take();
        self.session.is_speaking = false;
        self.session.inactivity_warning = false;
        self.session.status = if error.is_some() {
            CallStatus::Errored
        } else {
            CallStatus::Ended
        };
        self.last_termination = Some(reason);
        self.connection_error = error;

        let now = self.clock.now();
        if let Err(e) = self.store.write(now) {
            tracing::warn!(error = %e, "Failed to persist cooldown record");
        }
        self.cooldown_remaining = Some(self.settings.cooldown_period).filter(|p| !p.is_zero());

        tracing::info!(
            reason = %reason,
            local = reason.is_local(),
            call_id = ?call_id,
            status = %self.session.status,
            seconds_remaining = self.session.seconds_remaining,
            "Call finished"
        );

        if reason.is_local() {
            if let Some(Err(e)) = self.voice.as_mut().map(|voice| voice.stop()) {
                tracing::error!(error = %e, reason = %reason, "Voice client failed to stop");
            }
        }
        true
    }

    /// Snapshot for rendering
    pub fn view(&self) -> SessionView {
        let session = &self.session;
        SessionView {
            status: session.status,
            call_id: session.call_id.clone(),
            seconds_remaining: session.seconds_remaining,
            countdown_text: format_countdown(session.seconds_remaining),
            is_speaking: session.is_speaking,
            inactivity_warning: session.inactivity_warning,
            closing_notice_sent: session.warning_issued,
            connection_error: self.connection_error.clone(),
            cooldown_remaining: self.cooldown_remaining,
            cooldown_text: self.cooldown_remaining.map(cooldown_message),
            last_termination: self.last_termination,
        }
    }
}

impl Drop for CallSessionController {
    fn drop(&mut self) {
        self.dispose();
    }
}
