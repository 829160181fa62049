//! Persisted cooldown between demo calls.
//!
//! A single slot holds the time the last call ended, stored as epoch
//! milliseconds in plain text. It survives restarts and is last-write-wins;
//! the controller is its only writer.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fixed name of the cooldown slot
pub const COOLDOWN_KEY: &str = "last-call-ended-at";

/// A start was refused because the previous call ended too recently
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{}", crate::format::cooldown_message(*remaining))]
pub struct CooldownActive {
    pub remaining: Duration,
}

impl CooldownActive {
    pub fn remaining_millis(&self) -> u128 {
        self.remaining.as_millis()
    }
}

/// Storage for the last-call-ended timestamp
pub trait CooldownStore: Send + Sync {
    /// Time the last call ended, if recorded
    fn read(&self) -> Option<DateTime<Utc>>;

    /// Record the time a call ended
    fn write(&self, ended_at: DateTime<Utc>) -> Result<()>;

    /// Forget the recorded time
    fn clear(&self) -> Result<()>;

    /// Wait left before the next call, or `None` if there is no record or it expired
    fn remaining(&self, now: DateTime<Utc>, period: Duration) -> Option<Duration> {
        remaining_after(self.read()?, now, period)
    }
}

/// `period - (now - ended_at)`, or `None` once that is not positive.
///
/// A record in the future (clock moved backwards) counts as zero elapsed time.
pub fn remaining_after(
    ended_at: DateTime<Utc>,
    now: DateTime<Utc>,
    period: Duration,
) -> Option<Duration> {
    let elapsed = now
        .signed_duration_since(ended_at)
        .to_std()
        .unwrap_or(Duration::ZERO);
    period.checked_sub(elapsed).filter(|d| !d.is_zero())
}

/// Cooldown slot kept in a file under the state directory
#[derive(Debug, Clone)]
pub struct FileCooldownStore {
    path: PathBuf,
}

impl FileCooldownStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default XDG location
    pub fn default_location() -> Self {
        Self::new(crate::config::Config::cooldown_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CooldownStore for FileCooldownStore {
    fn read(&self) -> Option<DateTime<Utc>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read cooldown slot");
                return None;
            }
        };

        let parsed = content
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis);
        if parsed.is_none() {
            tracing::warn!(
                path = %self.path.display(),
                value = %content.trim(),
                "Ignoring malformed cooldown slot"
            );
        }
        parsed
    }

    fn write(&self, ended_at: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, ended_at.timestamp_millis().to_string()).map_err(|e| {
            Error::Store(format!(
                "failed to write {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process cooldown slot.
///
/// Clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryCooldownStore {
    slot: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl MemoryCooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(ended_at: DateTime<Utc>) -> Self {
        let store = Self::default();
        *store.lock() = Some(ended_at);
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CooldownStore for MemoryCooldownStore {
    fn read(&self) -> Option<DateTime<Utc>> {
        *self.lock()
    }

    fn write(&self, ended_at: DateTime<Utc>) -> Result<()> {
        *self.lock() = Some(ended_at);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    const TWO_HOURS: Duration = Duration::from_secs(7200);

    #[test]
    fn test_remaining_without_record() {
        let store = MemoryCooldownStore::new();
        assert_eq!(store.remaining(t0(), TWO_HOURS), None);
    }

    #[test]
    fn test_remaining_counts_down() {
        let store = MemoryCooldownStore::with_record(t0());
        let now = t0() + chrono::Duration::minutes(61);
        assert_eq!(
            store.remaining(now, TWO_HOURS),
            Some(Duration::from_secs(59 * 60))
        );
    }

    #[test]
    fn test_remaining_expires_exactly_at_period() {
        let store = MemoryCooldownStore::with_record(t0());
        assert_eq!(store.remaining(t0() + chrono::Duration::hours(2), TWO_HOURS), None);
        assert_eq!(store.remaining(t0() + chrono::Duration::minutes(121), TWO_HOURS), None);
    }

    #[test]
    fn test_future_record_blocks_full_period() {
        let now = t0();
        let store = MemoryCooldownStore::with_record(now + chrono::Duration::minutes(5));
        assert_eq!(store.remaining(now, TWO_HOURS), Some(TWO_HOURS));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCooldownStore::new(dir.path().join("state").join(COOLDOWN_KEY));

        assert_eq!(store.read(), None);
        store.write(t0()).unwrap();
        assert_eq!(store.read(), Some(t0()));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, "1700000000000");

        store.clear().unwrap();
        assert_eq!(store.read(), None);
        // Clearing an empty slot is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_ignores_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COOLDOWN_KEY);
        std::fs::write(&path, "not-a-number").unwrap();

        let store = FileCooldownStore::new(&path);
        assert_eq!(store.read(), None);
        assert_eq!(store.remaining(t0(), TWO_HOURS), None);
    }

    #[test]
    fn test_cooldown_active_message() {
        let err = CooldownActive {
            remaining: Duration::from_secs(59 * 60),
        };
        assert_eq!(err.remaining_millis(), 59 * 60 * 1000);
        assert_eq!(err.to_string(), "Next demo available in 59 minutes");
    }

    #[test]
    fn test_cooldown_active_is_an_error() {
        let err: Box<dyn std::error::Error> = Box::new(CooldownActive {
            remaining: Duration::from_secs(3 * 60 * 60),
        });
        assert_eq!(err.to_string(), "Next demo available in 3 hours");
        assert!(err.source().is_none());
    }
}
