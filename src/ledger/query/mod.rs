//! Read side of the ledger: balances and paginated history.
//!
//! Every read goes straight to the log. The latest entry carries the running
//! balance, so `balance` is a single indexed lookup.

use std::sync::Arc;

use tracing::debug;

use super::entry::validate_key;
use super::{LedgerEntry, LedgerError, Result};
use crate::storage::LedgerStore;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Largest page a single history call may return.
pub const MAX_HISTORY_LIMIT: u32 = 500;

/// One page of an account's history, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub entries: Vec<LedgerEntry>,
    /// Pass as `before_token` to fetch the next (older) page.
    /// `None` when this page was not full.
    pub next_cursor: Option<String>,
}

/// Balance and history reads over the transaction log.
#[derive(Clone)]
pub struct AccountQueryService {
    store: Arc<dyn LedgerStore>,
}

impl AccountQueryService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Current balance of an account. Unknown accounts have balance 0.
    #[tracing::instrument(name = "ledger.balance", skip(self))]
    pub async fn balance(&self, account_key: &str) -> Result<i64> {
        validate_key("account_key", account_key)?;
        let balance = self
            .store
            .latest_entry(account_key)
            .await?
            .map_or(0, |entry| entry.balance);
        Ok(balance)
    }

    /// Entries for an account in reverse sequence order.
    ///
    /// `before_token` must name an entry of the same account; only entries
    /// strictly older than it are returned.
    #[tracing::instrument(name = "ledger.history", skip(self))]
    pub async fn history(
        &self,
        account_key: &str,
        limit: u32,
        before_token: Option<&str>,
    ) -> Result<HistoryPage> {
        validate_key("account_key", account_key)?;
        if limit == 0 || limit > MAX_HISTORY_LIMIT {
            return Err(LedgerError::InvalidRequest(format!(
                "limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            )));
        }

        let before_sequence = match before_token {
            Some(token) => Some(self.cursor_sequence(account_key, token).await?),
            None => None,
        };

        let entries = self
            .store
            .history(account_key, limit, before_sequence)
            .await?;

        let next_cursor = if entries.len() == limit as usize {
            entries.last().map(|entry| entry.token.clone())
        } else {
            None
        };

        debug!(count = entries.len(), "history page loaded");
        Ok(HistoryPage {
            entries,
            next_cursor,
        })
    }

    /// Entry recorded for a token, if any.
    #[tracing::instrument(name = "ledger.entry", skip(self))]
    pub async fn entry(&self, token: &str) -> Result<Option<LedgerEntry>> {
        validate_key("token", token)?;
        Ok(self.store.find_by_token(token).await?)
    }

    async fn cursor_sequence(&self, account_key: &str, token: &str) -> Result<i64> {
        match self.store.find_by_token(token).await? {
            Some(entry) if entry.account_key == account_key => Ok(entry.sequence),
            _ => Err(LedgerError::InvalidRequest(format!(
                "unknown history cursor: {}",
                token
            ))),
        }
    }
}

#[cfg(test)]
mod tests;
