//! Ledger engine configuration.

use std::time::Duration;

use serde::Deserialize;

/// Ledger engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Upper bound on opening a transaction and taking the account lock.
    /// An attempt that waits longer is rolled back and retried.
    pub lock_timeout_ms: u64,
    /// Write-conflict retry policy.
    pub retry: RetryConfig,
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff for write-conflict retries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = no retries).
    pub max_retries: usize,
    /// Delay before the first retry (before jitter).
    pub min_delay_ms: u64,
    /// Delay cap (before jitter).
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_delay_ms: 10,
            max_delay_ms: 1_000,
        }
    }
}
