//! Ledger error types.

use crate::storage::StorageError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors surfaced by the ledger engine and query service.
///
/// Overdrafts are not errors: they are recorded and returned as
/// [`ApplyOutcome::Rejected`](super::ApplyOutcome::Rejected).
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed request, rejected before touching storage.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The token was already processed for a different account or amount.
    #[error("This request has already been performed with different parameters (token={token})")]
    TokenConflict { token: String },

    /// Write conflicts persisted through every retry.
    #[error("Ledger unavailable after {attempts} attempts")]
    LedgerUnavailable { attempts: usize },

    /// The backend could not be reached. Not retried by the ledger.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for LedgerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(msg) => LedgerError::StorageUnavailable(msg),
            other => LedgerError::Storage(other),
        }
    }
}

impl LedgerError {
    /// Contention the engine retries internally.
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, LedgerError::Storage(e) if e.is_write_conflict())
    }
}
