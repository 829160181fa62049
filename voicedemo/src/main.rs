//! voicedemo - time-boxed demo calls with an AI voice agent
//!
//! This tool provides commands for:
//! - Checking configuration and whether a demo call may start
//! - Running a demo call against the simulated agent
//! - Clearing the cooldown between calls
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/voicedemo/config.toml (~/.config/voicedemo/config.toml)
//! - State: $XDG_STATE_HOME/voicedemo/ (~/.local/state/voicedemo/)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use voicedemo_core::audio::{BrowserInfo, MicrophonePermission, PlatformAudioGate};
use voicedemo_core::clock::SystemClock;
use voicedemo_core::credentials::{CredentialProvider, RetryPolicy};
use voicedemo_core::voice::simulated::{SimulatedVoiceFactory, SimulationScript};
use voicedemo_core::{
    CallSessionController, CallStatus, Config, CooldownStore, ErrorKind, FileCooldownStore,
    Initializer, RuntimeSettings, SessionHandle, SessionRuntime, SessionSettings, SessionView,
    StartError,
};

/// User agent assumed when none is given
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Parser)]
#[command(name = "voicedemo")]
#[command(about = "Time-boxed demo calls with an AI voice agent")]
#[command(version)]
struct Args {
    /// Write logs to the state directory
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show configuration and whether a call may start
    Status,

    /// Run a demo call against the simulated agent
    Call {
        /// Assistant to call (default: from config or VOICEDEMO_ASSISTANT_ID)
        #[arg(long)]
        assistant_id: Option<String>,

        /// Call cap in seconds (default: from config)
        #[arg(long)]
        max_duration: Option<u32>,

        /// Seconds of silence before the call is ended (default: from config)
        #[arg(long)]
        inactivity_timeout: Option<u32>,

        /// Make the simulated agent go quiet after this many seconds
        #[arg(long)]
        silent_after: Option<u64>,

        /// Answer the microphone prompt with "deny"
        #[arg(long)]
        deny_microphone: bool,

        /// User agent used for the capability check
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Forget when the last call ended
    ResetCooldown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = if args.verbose {
        let guard = voicedemo_core::logging::init(&config.logging)
            .context("failed to initialize logging")?;
        eprintln!(
            "Logging to {}",
            voicedemo_core::logging::log_file_path().display()
        );
        Some(guard)
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config),
        Command::Call {
            assistant_id,
            max_duration,
            inactivity_timeout,
            silent_after,
            deny_microphone,
            user_agent,
        } => {
            let options = CallOptions {
                assistant_id,
                max_duration,
                inactivity_timeout,
                silent_after: silent_after.map(Duration::from_secs),
                microphone: if deny_microphone {
                    MicrophonePermission::Denied
                } else {
                    MicrophonePermission::Granted
                },
                user_agent: user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            };
            cmd_call(config, options).await
        }
        Command::ResetCooldown => cmd_reset_cooldown(),
    }
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("Voice Demo Configuration");
    println!("========================");
    println!();

    let call = &config.call;
    println!(
        "Assistant ID:       {}",
        call.assistant_id.as_deref().unwrap_or("<not set>")
    );
    println!(
        "Credentials:        {}",
        if !config.credentials.is_ready() {
            "<not set>".to_string()
        } else if config.credentials.api_key.is_some() {
            "<api key set>".to_string()
        } else {
            format!(
                "token endpoint {}",
                config.credentials.token_endpoint.as_deref().unwrap_or_default()
            )
        }
    );
    println!("Call cap:           {}s", call.max_duration_secs);
    if call.warning_enabled {
        println!("Closing notice at:  {}s remaining", call.warning_at_secs);
    } else {
        println!("Closing notice:     disabled");
    }
    println!("Inactivity cutoff:  {}s", call.inactivity_timeout_secs);
    println!("Cooldown:           {}s", config.cooldown.period_secs);
    println!();

    let store = FileCooldownStore::default_location();
    println!("Cooldown slot:      {}", store.path().display());

    match store.remaining(chrono::Utc::now(), config.cooldown.period()) {
        Some(remaining) => println!("{}", voicedemo_core::format::cooldown_message(remaining)),
        None => println!("Ready: a demo call can start now"),
    }

    Ok(())
}

struct CallOptions {
    assistant_id: Option<String>,
    max_duration: Option<u32>,
    inactivity_timeout: Option<u32>,
    silent_after: Option<Duration>,
    microphone: MicrophonePermission,
    user_agent: String,
}

async fn cmd_call(mut config: Config, options: CallOptions) -> Result<()> {
    if let Some(max) = options.max_duration {
        config.call.max_duration_secs = max;
        // Keep the closing notice inside a shortened call
        if config.call.warning_at_secs >= max {
            config.call.warning_at_secs = max / 2;
        }
    }
    if let Some(timeout) = options.inactivity_timeout {
        config.call.inactivity_timeout_secs = timeout;
        if config.call.inactivity_warning_lead_secs >= timeout {
            config.call.inactivity_warning_lead_secs = timeout / 2;
        }
    }
    config.validate().context("invalid call options")?;

    let assistant_id = options
        .assistant_id
        .or_else(|| config.call.assistant_id.clone())
        .context("no assistant id: pass --assistant-id, set call.assistant_id or VOICEDEMO_ASSISTANT_ID")?;

    let provider = CredentialProvider::from_config(&config.credentials)
        .context("voice credentials are not configured")?;
    let initializer = Initializer {
        provider,
        factory: Box::new(SimulatedVoiceFactory::new(SimulationScript {
            silent_after: options.silent_after,
            ..Default::default()
        })),
        policy: RetryPolicy::from_config(&config.credentials),
    };

    let gate = PlatformAudioGate {
        browser: BrowserInfo::from_user_agent(&options.user_agent),
        microphone: options.microphone,
    };
    let controller = CallSessionController::uninitialized(
        SessionSettings::from_config(&config),
        Box::new(FileCooldownStore::default_location()),
        Box::new(gate),
        Arc::new(SystemClock),
    );
    let session = SessionRuntime::spawn_with_initializer(
        controller,
        initializer,
        RuntimeSettings::from_config(&config),
    );

    tracing::info!(assistant_id = %assistant_id, "Initializing voice client");
    if let Err(error) = session.initialize().await {
        session.dispose().await;
        return Err(start_failure(error));
    }
    if let Err(error) = session.start_call(assistant_id.as_str()).await {
        session.dispose().await;
        return Err(start_failure(error));
    }

    println!("Calling assistant {}...", assistant_id);
    let view = follow_call(&session).await?;
    session.dispose().await;

    print_summary(&view);
    if view.status == CallStatus::Errored {
        bail!("call failed");
    }
    Ok(())
}

fn start_failure(error: StartError) -> anyhow::Error {
    match error {
        StartError::Cooldown(active) => anyhow!("{}", active),
        StartError::Failed(error) if error.is_retryable() => {
            anyhow!("{} (run the command again to retry)", error.message)
        }
        StartError::Failed(error) => anyhow!("{}", error.message),
        other => anyhow!("{}", other),
    }
}

/// What Ctrl-C does to the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Regular hang-up of a connected call
    HangUp,
    /// Tear the session down; the call never got through
    Cancel,
}

fn interrupt_for(status: CallStatus) -> Interrupt {
    match status {
        CallStatus::Connected => Interrupt::HangUp,
        _ => Interrupt::Cancel,
    }
}

/// Print view changes until the call reaches a terminal status
async fn follow_call(session: &SessionHandle) -> Result<SessionView> {
    let mut views = session.subscribe();
    let mut last_line = String::new();
    let mut hanging_up = false;

    loop {
        let view = views.borrow_and_update().clone();
        let line = render(&view);
        if line != last_line {
            println!("{}", line);
            last_line = line;
        }
        if view.status.is_terminal() {
            return Ok(view);
        }

        tokio::select! {
            changed = views.changed() => {
                changed.context("session stopped unexpectedly")?;
            }
            signal = tokio::signal::ctrl_c(), if !hanging_up => {
                signal.context("failed to listen for Ctrl-C")?;
                hanging_up = true;
                match interrupt_for(view.status) {
                    Interrupt::HangUp => {
                        println!("Hanging up...");
                        session.end_call().await;
                    }
                    Interrupt::Cancel => {
                        println!("Cancelling the call...");
                        session.dispose().await;
                    }
                }
            }
        }
    }
}

fn render(view: &SessionView) -> String {
    let mut line = format!("[{}]", view.status);
    if view.is_connecting() {
        line.push_str(" waiting for the agent to pick up");
    }
    if view.status == CallStatus::Connected {
        line.push_str(&format!(" {} remaining", view.countdown_text));
        if view.is_speaking {
            line.push_str("  agent speaking");
        }
        if view.closing_notice_sent {
            line.push_str("  wrapping up");
        }
        if view.inactivity_warning {
            line.push_str("  still there? the call ends soon if nobody speaks");
        }
    }
    line
}

fn print_summary(view: &SessionView) {
    println!();
    if let Some(reason) = view.last_termination {
        println!("Call ended: {}", reason);
    }
    if let Some(error) = &view.connection_error {
        if error.kind != ErrorKind::Admission {
            println!("Error: {}", error.message);
        }
    }
    if let Some(text) = &view.cooldown_text {
        println!("{}", text);
    }
}

fn cmd_reset_cooldown() -> Result<()> {
    let store = FileCooldownStore::default_location();
    store
        .clear()
        .with_context(|| format!("failed to clear {}", store.path().display()))?;
    println!("Cooldown cleared: a demo call can start now");
    Ok(())
}
