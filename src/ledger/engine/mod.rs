//! Transactional ledger engine.
//!
//! Every `apply` runs one read-modify-write inside a storage transaction:
//!
//! ```text
//! begin -> lock_account -> find_by_token --found--> rollback, replay
//!                               |
//!                            missing
//!                               v
//!               latest_entry -> insert applied|rejected -> commit
//! ```
//!
//! Write conflicts (and lock waits that outlive the lock timeout) are rolled
//! back and retried with backoff. A duplicate-key error on insert means a
//! concurrent request with the same token committed first; the engine then
//! returns that request's entry.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::{
    AccountQueryService, ApplyOutcome, ApplyRequest, EntryStatus, LedgerEntry, LedgerError,
    RejectionReason, Result,
};
use crate::config::LedgerConfig;
use crate::storage::{LedgerStore, LedgerTransaction, StorageError};
use crate::utils::retry::attempt_delays;

/// Applies credit/debit requests to accounts exactly once per token.
#[derive(Clone)]
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    config: LedgerConfig,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Read-side service over the same store.
    pub fn queries(&self) -> AccountQueryService {
        AccountQueryService::new(Arc::clone(&self.store))
    }

    /// Apply a signed amount to an account under an idempotency token.
    ///
    /// Returns the committed entry (`Applied` or `Rejected`) or, when the
    /// token was seen before, the original entry (`Replayed`).
    pub async fn apply(&self, account_key: &str, token: &str, amount: i64) -> Result<ApplyOutcome> {
        self.apply_request(&ApplyRequest::new(account_key, token, amount))
            .await
    }

    #[tracing::instrument(
        name = "ledger.apply",
        skip_all,
        fields(
            account_key = %request.account_key,
            token = %request.token,
            amount = request.amount,
            backend = self.store.backend(),
        )
    )]
    pub async fn apply_request(&self, request: &ApplyRequest) -> Result<ApplyOutcome> {
        request.validate()?;

        let mut attempts = 0;
        for delay in attempt_delays(&self.config.retry) {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempts += 1;

            match self.read_modify_write(request).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_write_conflict() => {
                    warn!(attempt = attempts, error = %e, "write conflict, retrying");
                }
                Err(LedgerError::Storage(StorageError::DuplicateKey(reason))) => {
                    // Someone committed the same token (or sequence) first.
                    match self.store.find_by_token(&request.token).await? {
                        Some(entry) => {
                            debug!("token committed concurrently, replaying");
                            return self.replay(request, entry);
                        }
                        None => {
                            warn!(attempt = attempts, %reason, "sequence collision, retrying");
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }

        error!(attempts, "write conflicts persisted through all retries");
        Err(LedgerError::LedgerUnavailable { attempts })
    }

    /// Open a transaction and lock the account, bounded by the lock timeout.
    ///
    /// On timeout the pending future is dropped, which drops its storage
    /// transaction and rolls it back.
    async fn lock(&self, account_key: &str) -> Result<Box<dyn LedgerTransaction>> {
        let timeout = self.config.lock_timeout();
        let locking = async {
            let mut tx = self.store.begin().await?;
            tx.lock_account(account_key).await?;
            Ok::<_, StorageError>(tx)
        };
        match tokio::time::timeout(timeout, locking).await {
            Ok(locked) => Ok(locked?),
            Err(_) => Err(LedgerError::Storage(StorageError::WriteConflict(format!(
                "account lock not acquired within {:?}",
                timeout
            )))),
        }
    }

    /// One attempt. Once the lock is held the attempt runs to completion.
    async fn read_modify_write(&self, request: &ApplyRequest) -> Result<ApplyOutcome> {
        let mut tx = self.lock(&request.account_key).await?;

        if let Some(existing) = tx.find_by_token(&request.token).await? {
            tx.rollback().await?;
            return self.replay(request, existing);
        }

        let (previous_balance, sequence) = match tx.latest_entry(&request.account_key).await? {
            Some(latest) => (latest.balance, latest.sequence + 1),
            None => (0, 1),
        };

        let proposed = previous_balance.checked_add(request.amount).ok_or_else(|| {
            LedgerError::InvalidRequest(format!(
                "amount {} overflows balance {}",
                request.amount, previous_balance
            ))
        })?;

        let (status, balance) = if proposed < 0 {
            (EntryStatus::Rejected, previous_balance)
        } else {
            (EntryStatus::Applied, proposed)
        };

        let entry = LedgerEntry {
            token: request.token.clone(),
            account_key: request.account_key.clone(),
            sequence,
            amount: request.amount,
            balance,
            status,
            created_at: Utc::now(),
        };

        tx.insert_entry(&entry).await?;
        tx.commit().await?;

        match status {
            EntryStatus::Applied => {
                info!(sequence, previous_balance, balance, "entry applied");
                Ok(ApplyOutcome::Applied(entry))
            }
            EntryStatus::Rejected => {
                info!(sequence, balance, "debit rejected: insufficient balance");
                Ok(ApplyOutcome::Rejected {
                    entry,
                    reason: RejectionReason::InsufficientBalance,
                })
            }
        }
    }

    fn replay(&self, request: &ApplyRequest, entry: LedgerEntry) -> Result<ApplyOutcome> {
        if !request.matches(&entry) {
            warn!(
                stored_account = %entry.account_key,
                stored_amount = entry.amount,
                "token reused with different parameters"
            );
            return Err(LedgerError::TokenConflict {
                token: request.token.clone(),
            });
        }
        debug!(sequence = entry.sequence, "replaying recorded entry");
        Ok(ApplyOutcome::Replayed(entry))
    }
}
