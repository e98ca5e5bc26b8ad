//! Ledger entry and request types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::{LedgerError, Result};
use crate::storage::schema::KEY_MAX_LEN;

/// Outcome recorded on a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    Applied,
    Rejected,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Applied => "applied",
            EntryStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "applied" => Ok(EntryStatus::Applied),
            "rejected" => Ok(EntryStatus::Rejected),
            other => Err(format!("unknown entry status: {}", other)),
        }
    }
}

/// One row of the append-only transaction log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Idempotency token that produced this entry. Globally unique.
    pub token: String,
    pub account_key: String,
    /// Position in the account's log, starting at 1.
    pub sequence: i64,
    /// Signed amount in minor units. Rejected entries keep the attempted amount.
    pub amount: i64,
    /// Balance after this entry. Unchanged from the previous entry when rejected.
    pub balance: i64,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn is_applied(&self) -> bool {
        self.status == EntryStatus::Applied
    }

    /// Balance this entry was computed against.
    pub fn previous_balance(&self) -> i64 {
        if self.is_applied() {
            self.balance - self.amount
        } else {
            self.balance
        }
    }
}

/// Why a request was recorded as rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// The debit would have taken the balance below zero.
    InsufficientBalance,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::InsufficientBalance => f.write_str("insufficient balance"),
        }
    }
}

/// Result of [`LedgerEngine::apply`](super::LedgerEngine::apply).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A new applied entry was committed.
    Applied(LedgerEntry),
    /// The token had already been processed; the original entry is returned.
    Replayed(LedgerEntry),
    /// A new rejected entry was committed.
    Rejected {
        entry: LedgerEntry,
        reason: RejectionReason,
    },
}

impl ApplyOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            ApplyOutcome::Applied(entry) | ApplyOutcome::Replayed(entry) => entry,
            ApplyOutcome::Rejected { entry, .. } => entry,
        }
    }

    pub fn into_entry(self) -> LedgerEntry {
        match self {
            ApplyOutcome::Applied(entry) | ApplyOutcome::Replayed(entry) => entry,
            ApplyOutcome::Rejected { entry, .. } => entry,
        }
    }

    pub fn balance(&self) -> i64 {
        self.entry().balance
    }

    /// Status label exposed to callers: `applied`, `rejected` or `replayed`.
    pub fn status(&self) -> &'static str {
        match self {
            ApplyOutcome::Applied(_) => "applied",
            ApplyOutcome::Replayed(_) => "replayed",
            ApplyOutcome::Rejected { .. } => "rejected",
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, ApplyOutcome::Replayed(_))
    }
}

/// A credit/debit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    pub account_key: String,
    pub token: String,
    pub amount: i64,
}

impl ApplyRequest {
    pub fn new(account_key: impl Into<String>, token: impl Into<String>, amount: i64) -> Self {
        Self {
            account_key: account_key.into(),
            token: token.into(),
            amount,
        }
    }

    /// Reject malformed requests before any storage access.
    pub fn validate(&self) -> Result<()> {
        validate_key("account_key", &self.account_key)?;
        validate_key("token", &self.token)?;
        if self.amount == 0 {
            return Err(LedgerError::InvalidRequest(
                "amount must be nonzero".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a stored entry was produced by an identical request.
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        entry.token == self.token
            && entry.account_key == self.account_key
            && entry.amount == self.amount
    }
}

pub(crate) fn validate_key(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(LedgerError::InvalidRequest(format!(
            "{} must not be empty",
            field
        )));
    }
    if value.len() > KEY_MAX_LEN {
        return Err(LedgerError::InvalidRequest(format!(
            "{} exceeds {} bytes",
            field, KEY_MAX_LEN
        )));
    }
    Ok(())
}
