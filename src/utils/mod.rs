//! Shared helpers: logging bootstrap and retry backoff.

pub mod bootstrap;
pub mod retry;
