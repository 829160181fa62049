//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/voicedemo/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/voicedemo/` (~/.config/voicedemo/)
//! - State/Logs/Cooldown: `$XDG_STATE_HOME/voicedemo/` (~/.local/state/voicedemo/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `credentials.api_key`
pub const API_KEY_ENV: &str = "VOICEDEMO_API_KEY";

/// Environment variable overriding `call.assistant_id`
pub const ASSISTANT_ID_ENV: &str = "VOICEDEMO_ASSISTANT_ID";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Call limits and the closing notice
    #[serde(default)]
    pub call: CallConfig,

    /// Cooldown between demo calls
    #[serde(default)]
    pub cooldown: CooldownConfig,

    /// Where the voice credential comes from
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Per-call limits
#[derive(Debug, Deserialize, Clone)]
pub struct CallConfig {
    /// Assistant to connect to (can also use env var)
    pub assistant_id: Option<String>,

    /// Hard cap on call length, enforced locally and sent to the server
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u32,

    /// Remaining seconds at which the closing notice goes to the agent
    #[serde(default = "default_warning_at_secs")]
    pub warning_at_secs: u32,

    /// Whether the closing notice is sent at all
    #[serde(default = "default_true")]
    pub warning_enabled: bool,

    /// Text the agent is asked to say when time runs low
    #[serde(default = "default_warning_message")]
    pub warning_message: String,

    /// Seconds without speech before the call is ended
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u32,

    /// Seconds before the inactivity cutoff at which the UI warns
    #[serde(default = "default_inactivity_warning_lead_secs")]
    pub inactivity_warning_lead_secs: u32,

    /// Inactivity poll interval in milliseconds
    #[serde(default = "default_inactivity_poll_ms")]
    pub inactivity_poll_ms: u64,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            assistant_id: None,
            max_duration_secs: default_max_duration_secs(),
            warning_at_secs: default_warning_at_secs(),
            warning_enabled: true,
            warning_message: default_warning_message(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            inactivity_warning_lead_secs: default_inactivity_warning_lead_secs(),
            inactivity_poll_ms: default_inactivity_poll_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_duration_secs() -> u32 {
    180
}

fn default_warning_at_secs() -> u32 {
    30
}

fn default_warning_message() -> String {
    "UPS, looks like I gotta go. It has been a real pleasure. Talk soon.".to_string()
}

fn default_inactivity_timeout_secs() -> u32 {
    20
}

fn default_inactivity_warning_lead_secs() -> u32 {
    5
}

fn default_inactivity_poll_ms() -> u64 {
    500
}

/// Cooldown between demo calls
#[derive(Debug, Deserialize, Clone)]
pub struct CooldownConfig {
    /// Minimum gap between the end of one call and the start of the next
    #[serde(default = "default_cooldown_period_secs")]
    pub period_secs: u64,

    /// How often the remaining wait is re-read from the store
    #[serde(default = "default_cooldown_refresh_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            period_secs: default_cooldown_period_secs(),
            refresh_interval_secs: default_cooldown_refresh_secs(),
        }
    }
}

impl CooldownConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

fn default_cooldown_period_secs() -> u64 {
    2 * 60 * 60
}

fn default_cooldown_refresh_secs() -> u64 {
    30
}

/// Credential source configuration
///
/// A static `api_key` wins over `token_endpoint`.
#[derive(Debug, Deserialize, Clone)]
pub struct CredentialsConfig {
    /// API key baked into the deployment (can also use env var)
    pub api_key: Option<String>,

    /// Same-origin token endpoint answering `POST` with `{"apiKey": "..."}`
    pub token_endpoint: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_credentials_timeout")]
    pub timeout_secs: u64,

    /// Attempts (including the first) before initialization gives up
    #[serde(default = "default_credentials_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on the retry delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            token_endpoint: None,
            timeout_secs: default_credentials_timeout(),
            max_attempts: default_credentials_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl CredentialsConfig {
    /// Check if some credential source is configured
    pub fn is_ready(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty()) || self.token_endpoint.is_some()
    }
}

fn default_credentials_timeout() -> u64 {
    10
}

fn default_credentials_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8000
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path, then apply env overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Replace credential and assistant settings from the environment
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = non_empty_env(API_KEY_ENV) {
            self.credentials.api_key = Some(key);
        }
        if let Some(id) = non_empty_env(ASSISTANT_ID_ENV) {
            self.call.assistant_id = Some(id);
        }
    }

    /// Validate limits, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let call = &self.call;
        if call.max_duration_secs == 0 {
            return Err(Error::Config(
                "call.max_duration_secs must be greater than 0".to_string(),
            ));
        }
        if call.warning_enabled && call.warning_at_secs >= call.max_duration_secs {
            return Err(Error::Config(
                "call.warning_at_secs must be below call.max_duration_secs".to_string(),
            ));
        }
        if call.inactivity_timeout_secs == 0 {
            return Err(Error::Config(
                "call.inactivity_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if call.inactivity_warning_lead_secs >= call.inactivity_timeout_secs {
            return Err(Error::Config(
                "call.inactivity_warning_lead_secs must be below call.inactivity_timeout_secs"
                    .to_string(),
            ));
        }
        if call.inactivity_poll_ms == 0 || call.inactivity_poll_ms > 1000 {
            return Err(Error::Config(
                "call.inactivity_poll_ms must be between 1 and 1000".to_string(),
            ));
        }
        if self.cooldown.refresh_interval_secs == 0 {
            return Err(Error::Config(
                "cooldown.refresh_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.credentials.max_attempts == 0 {
            return Err(Error::Config(
                "credentials.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/voicedemo/config.toml` (~/.config/voicedemo/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("voicedemo").join("config.toml")
    }

    /// Returns the state directory path (for logs and the cooldown slot)
    ///
    /// `$XDG_STATE_HOME/voicedemo/` (~/.local/state/voicedemo/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("voicedemo")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/voicedemo/voicedemo.log` (~/.local/state/voicedemo/voicedemo.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("voicedemo.log")
    }

    /// Returns the persisted cooldown slot path
    ///
    /// `$XDG_STATE_HOME/voicedemo/last-call-ended-at`
    pub fn cooldown_path() -> PathBuf {
        Self::state_dir().join(crate::cooldown::COOLDOWN_KEY)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.call.max_duration_secs, 180);
        assert_eq!(config.call.warning_at_secs, 30);
        assert_eq!(config.call.inactivity_timeout_secs, 20);
        assert_eq!(config.call.inactivity_warning_lead_secs, 5);
        assert_eq!(config.cooldown.period(), Duration::from_secs(7200));
        assert!(config.call.assistant_id.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[call]
assistant_id = "asst-123"
max_duration_secs = 144
inactivity_timeout_secs = 15

[cooldown]
period_secs = 600

[credentials]
token_endpoint = "https://example.com/.netlify/functions/get-vapi-token"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.call.assistant_id.as_deref(), Some("asst-123"));
        assert_eq!(config.call.max_duration_secs, 144);
        assert_eq!(config.call.inactivity_timeout_secs, 15);
        assert_eq!(config.call.warning_at_secs, 30);
        assert_eq!(config.cooldown.period_secs, 600);
        assert!(config.credentials.is_ready());
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_bad_limits() {
        let mut config = Config::default();
        config.call.warning_at_secs = 180;
        assert!(config.validate().is_err());

        // A disabled notice does not constrain the threshold
        config.call.warning_enabled = false;
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.call.inactivity_warning_lead_secs = 20;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.call.inactivity_poll_ms = 1500;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.credentials.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_readiness() {
        let mut creds = CredentialsConfig::default();
        assert!(!creds.is_ready());

        creds.api_key = Some(String::new());
        assert!(!creds.is_ready());

        creds.api_key = Some("pk_live".to_string());
        assert!(creds.is_ready());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cooldown]\nperiod_secs = 60\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.cooldown.period_secs, 60);

        std::fs::write(&path, "[cooldown\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_cooldown_path_in_state_dir() {
        assert!(Config::cooldown_path().ends_with("voicedemo/last-call-ended-at"));
        assert!(Config::log_path().ends_with("voicedemo.log"));
    }
}
