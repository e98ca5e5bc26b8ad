//! Airtime ledger core.
//!
//! - [`LedgerEngine`]: applies credit/debit requests exactly once per token
//! - [`AccountQueryService`]: balance and history reads over the log

mod engine;
mod entry;
mod error;
mod query;

pub use engine::LedgerEngine;
pub use entry::{ApplyOutcome, ApplyRequest, EntryStatus, LedgerEntry, RejectionReason};
pub use error::{LedgerError, Result};
pub use query::{AccountQueryService, HistoryPage, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
