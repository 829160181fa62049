//! # voicedemo-core
//!
//! Core library for voicedemo - a time-boxed demo voice call with a
//! hosted AI agent.
//!
//! This library provides:
//! - The call session controller (countdown, inactivity cutoff, cooldown)
//! - The voice SDK boundary and a simulated agent
//! - Credential retrieval with retry
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! A session moves through `Idle → Connecting → Connected → Ended | Errored`:
//! - **Admission:** cooldown record and audio capability are checked in the click handler
//! - **Live call:** a 1 Hz countdown and a sub-second inactivity poll run while Connected
//! - **Termination:** one guarded exit path writes the cooldown record and stops the SDK
//!
//! ## Example
//!
//! ```rust,no_run
//! use voicedemo_core::credentials::{self, CredentialProvider, RetryPolicy};
//! use voicedemo_core::voice::simulated::SimulatedVoiceFactory;
//! use voicedemo_core::{
//!     CallSessionController, Config, FileCooldownStore, RuntimeSettings, SessionRuntime,
//!     SessionSettings,
//! };
//! use voicedemo_core::audio::{AudioAccess, StaticAudioGate};
//!
//! # async fn demo() -> voicedemo_core::Result<()> {
//! let config = Config::load()?;
//! let provider = CredentialProvider::from_config(&config.credentials)?;
//! let factory = SimulatedVoiceFactory::default();
//! let policy = RetryPolicy::from_config(&config.credentials);
//! let connection = credentials::initialize(&provider, &factory, &policy).await?;
//!
//! let controller = CallSessionController::new(
//!     SessionSettings::from_config(&config),
//!     connection.client,
//!     Box::new(FileCooldownStore::default_location()),
//!     Box::new(StaticAudioGate(AudioAccess::Granted)),
//! );
//! let session = SessionRuntime::spawn(
//!     controller,
//!     connection.events,
//!     RuntimeSettings::from_config(&config),
//! );
//! if let Err(e) = session.start_call("assistant-id").await {
//!     println!("{}", e);
//! }
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use cooldown::{CooldownActive, CooldownStore, FileCooldownStore, MemoryCooldownStore};
pub use error::{Error, Result};
pub use session::{
    CallSessionController, Initializer, RuntimeSettings, SessionHandle, SessionRuntime,
    SessionSettings, StartError,
};
pub use types::*;

// Public modules
pub mod audio;
pub mod clock;
pub mod config;
pub mod cooldown;
pub mod credentials;
pub mod error;
pub mod format;
pub mod logging;
pub mod session;
pub mod types;
pub mod voice;
