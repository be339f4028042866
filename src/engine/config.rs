//! Engine tuning knobs.
//!
//! Loaded from an optional JSON file:
//! ```json
//! { "maxAttempts": 3, "retryBackoffMs": 5, "lockTimeoutMs": 250 }
//! ```
//! Missing keys fall back to the defaults.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 5;
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfigFile {
    max_attempts: u32,
    retry_backoff_ms: u64,
    lock_timeout_ms: u64,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Total attempts for one transfer, first try included. Never below 1.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff: Duration,
    /// Longest a transaction waits for an account lock before reporting a conflict.
    pub lock_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        ConfigFile::default().into()
    }
}

impl From<ConfigFile> for EngineConfig {
    fn from(file: ConfigFile) -> Self {
        Self {
            max_attempts: file.max_attempts.max(1),
            retry_backoff: Duration::from_millis(file.retry_backoff_ms),
            lock_timeout: Duration::from_millis(file.lock_timeout_ms),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: ConfigFile = serde_json::from_str(json)?;
        Ok(file.into())
    }

    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self, super::Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Sleep before attempt number `attempt` (1-based; the first attempt never waits).
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        match attempt {
            0 | 1 => Duration::ZERO,
            n => self.retry_backoff.saturating_mul(1_u32 << (n - 2).min(16)),
        }
    }
}
