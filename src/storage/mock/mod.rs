//! Mock storage implementation for testing.
//!
//! Keeps the log in memory behind a single async mutex: a transaction holds
//! the mutex from `begin` until commit/rollback/drop, so writers are
//! serialized the same way SQLite serializes them. Faults can be injected
//! to exercise the engine's retry and replay paths.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{LedgerStore, LedgerTransaction, Result, StorageError};
use crate::ledger::LedgerEntry;

#[derive(Default)]
struct MockState {
    entries: Vec<LedgerEntry>,
    accounts: HashSet<String>,
}

impl MockState {
    fn find_by_token(&self, token: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.token == token)
    }

    fn latest_entry(&self, account_key: &str) -> Option<&LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.account_key == account_key)
            .max_by_key(|e| e.sequence)
    }
}

#[derive(Default)]
struct MockFaults {
    unavailable: RwLock<bool>,
    conflicts_remaining: RwLock<usize>,
    racing_entry: RwLock<Option<LedgerEntry>>,
    lock_delay: RwLock<Option<Duration>>,
    commit_delay: RwLock<Option<Duration>>,
    begin_count: AtomicUsize,
}

/// Mock ledger store that keeps entries in memory.
#[derive(Default)]
pub struct MockLedgerStore {
    state: Arc<Mutex<MockState>>,
    faults: Arc<MockFaults>,
}

impl MockLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call with `StorageError::Unavailable` while set.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.faults.unavailable.write().await = unavailable;
    }

    /// Make the next `count` entry inserts fail with a write conflict.
    pub async fn fail_next_inserts_with_conflict(&self, count: usize) {
        *self.faults.conflicts_remaining.write().await = count;
    }

    /// Commit `entry` on behalf of a concurrent writer just before the next
    /// entry insert, as if it won a race for the token.
    pub async fn race_next_insert_with(&self, entry: LedgerEntry) {
        *self.faults.racing_entry.write().await = Some(entry);
    }

    /// Stall every `lock_account` call.
    pub async fn set_lock_delay(&self, delay: Option<Duration>) {
        *self.faults.lock_delay.write().await = delay;
    }

    /// Delay the acknowledgement of every commit. Writes are visible before
    /// the delay starts.
    pub async fn set_commit_delay(&self, delay: Option<Duration>) {
        *self.faults.commit_delay.write().await = delay;
    }

    /// Number of transactions opened so far.
    pub fn begin_count(&self) -> usize {
        self.faults.begin_count.load(Ordering::SeqCst)
    }

    /// Accounts created by committed transactions, sorted.
    pub async fn accounts(&self) -> Vec<String> {
        let mut accounts: Vec<String> = self.state.lock().await.accounts.iter().cloned().collect();
        accounts.sort();
        accounts
    }

    /// All committed entries in insertion order.
    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().await.entries.clone()
    }

    async fn check_available(&self) -> Result<()> {
        if *self.faults.unavailable.read().await {
            return Err(StorageError::Unavailable("mock store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MockLedgerStore {
    fn backend(&self) -> &'static str {
        "mock"
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        self.check_available().await?;
        self.faults.begin_count.fetch_add(1, Ordering::SeqCst);
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(MockTransaction {
            guard,
            faults: Arc::clone(&self.faults),
            pending: Vec::new(),
            pending_accounts: Vec::new(),
        }))
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<LedgerEntry>> {
        self.check_available().await?;
        Ok(self.state.lock().await.find_by_token(token).cloned())
    }

    async fn latest_entry(&self, account_key: &str) -> Result<Option<LedgerEntry>> {
        self.check_available().await?;
        Ok(self.state.lock().await.latest_entry(account_key).cloned())
    }

    async fn history(
        &self,
        account_key: &str,
        limit: u32,
        before_sequence: Option<i64>,
    ) -> Result<Vec<LedgerEntry>> {
        self.check_available().await?;
        let state = self.state.lock().await;
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .iter()
            .filter(|e| e.account_key == account_key)
            .filter(|e| before_sequence.map_or(true, |before| e.sequence < before))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        entries.truncate(limit as usize);
        Ok(entries)
    }
}

/// Transaction over the mock store. Pending writes are discarded on drop.
struct MockTransaction {
    guard: OwnedMutexGuard<MockState>,
    faults: Arc<MockFaults>,
    pending: Vec<LedgerEntry>,
    pending_accounts: Vec<String>,
}

impl MockTransaction {
    fn visible(&self) -> impl Iterator<Item = &LedgerEntry> + '_ {
        self.guard.entries.iter().chain(self.pending.iter())
    }
}

#[async_trait]
impl LedgerTransaction for MockTransaction {
    async fn lock_account(&mut self, account_key: &str) -> Result<()> {
        let delay = *self.faults.lock_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.pending_accounts.push(account_key.to_string());
        Ok(())
    }

    async fn find_by_token(&mut self, token: &str) -> Result<Option<LedgerEntry>> {
        Ok(self.visible().find(|e| e.token == token).cloned())
    }

    async fn latest_entry(&mut self, account_key: &str) -> Result<Option<LedgerEntry>> {
        Ok(self
            .visible()
            .filter(|e| e.account_key == account_key)
            .max_by_key(|e| e.sequence)
            .cloned())
    }

    async fn insert_entry(&mut self, entry: &LedgerEntry) -> Result<()> {
        {
            let mut remaining = self.faults.conflicts_remaining.write().await;
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::WriteConflict(
                    "injected write conflict".to_string(),
                ));
            }
        }

        if let Some(racer) = self.faults.racing_entry.write().await.take() {
            self.guard.entries.push(racer);
        }

        if self.visible().any(|e| e.token == entry.token) {
            return Err(StorageError::DuplicateKey(format!(
                "token {} already recorded",
                entry.token
            )));
        }
        if self
            .visible()
            .any(|e| e.account_key == entry.account_key && e.sequence == entry.sequence)
        {
            return Err(StorageError::DuplicateKey(format!(
                "sequence {} already recorded for {}",
                entry.sequence, entry.account_key
            )));
        }

        self.pending.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MockTransaction {
            mut guard,
            faults,
            pending,
            pending_accounts,
        } = *self;
        guard.entries.extend(pending);
        guard.accounts.extend(pending_accounts);
        drop(guard);

        let delay = *faults.commit_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
