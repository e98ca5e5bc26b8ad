//! Retry utilities: backoff builders for write-conflict retries.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};

use crate::config::RetryConfig;

/// Backoff for ledger write-conflict retries.
///
/// Defaults (see [`RetryConfig`]):
/// - Min delay: 10ms
/// - Max delay: 1s
/// - Max retries: 5
/// - Jitter enabled
pub fn write_conflict_backoff(config: &RetryConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_delay_ms))
        .with_max_delay(Duration::from_millis(config.max_delay_ms))
        .with_max_times(config.max_retries)
        .with_jitter()
}

/// Delays to wait before each attempt: zero for the first, then the backoff.
///
/// Yields `max_retries + 1` items in total.
pub fn attempt_delays(config: &RetryConfig) -> impl Iterator<Item = Duration> {
    std::iter::once(Duration::ZERO).chain(write_conflict_backoff(config).build())
}
