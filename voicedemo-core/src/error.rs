//! Error types for voicedemo-core

use thiserror::Error;

/// Main error type for the voicedemo-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential retrieval failed
    ///
    /// `status` carries the HTTP status when the token endpoint answered.
    #[error("credential error{}: {message}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Credentials {
        status: Option<u16>,
        message: String,
    },

    /// Voice client error (construction, start, stop, send)
    #[error("voice client error: {0}")]
    Voice(String),

    /// Cooldown slot could not be read or written
    #[error("cooldown store error: {0}")]
    Store(String),
}

impl Error {
    /// Whether a retry may succeed.
    ///
    /// Server errors and transport failures are transient; 4xx answers and
    /// malformed responses mean the deployment is misconfigured.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Credentials {
                status: Some(status),
                ..
            } => *status >= 500,
            Error::Credentials { status: None, .. } => true,
            Error::Voice(_) => true,
            _ => false,
        }
    }
}

/// Result type alias for voicedemo-core
pub type Result<T> = std::result::Result<T, Error>;
