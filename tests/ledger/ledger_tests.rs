//! Ledger engine contract tests.
//!
//! These tests verify the behavior of LedgerEngine and AccountQueryService
//! over a real storage backend. Each storage implementation should run them.
//! Tests share one database, so every test works on its own accounts.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use airtime_ledger::config::{LedgerConfig, RetryConfig};
use airtime_ledger::ledger::{ApplyOutcome, EntryStatus, LedgerEngine, LedgerError};
use airtime_ledger::storage::Storage;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Key unique to this test run.
pub fn unique(name: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", name, nanos, n)
}

/// Engine settings that tolerate heavy contention on slow CI machines.
pub fn contract_config() -> LedgerConfig {
    LedgerConfig {
        lock_timeout_ms: 10_000,
        retry: RetryConfig {
            max_retries: 20,
            min_delay_ms: 5,
            max_delay_ms: 200,
        },
    }
}

pub fn engine(storage: &Storage) -> LedgerEngine {
    LedgerEngine::new(storage.ledger.clone(), contract_config())
}

// =============================================================================
// Single-request behavior
// =============================================================================

pub async fn test_credit_reject_replay_debit(storage: &Storage) {
    let engine = engine(storage);
    let account = unique("scenario");
    let (t1, t2, t3) = (unique("t1"), unique("t2"), unique("t3"));

    let credit = engine.apply(&account, &t1, 100).await.expect("credit");
    assert_eq!(credit.status(), "applied");
    assert_eq!(credit.balance(), 100);

    let overdraft = engine.apply(&account, &t2, -150).await.expect("overdraft");
    assert_eq!(overdraft.status(), "rejected");
    assert_eq!(overdraft.balance(), 100);

    let replay = engine.apply(&account, &t1, 100).await.expect("replay");
    assert_eq!(replay.status(), "replayed");
    assert_eq!(replay.balance(), 100);

    let debit = engine.apply(&account, &t3, -50).await.expect("debit");
    assert_eq!(debit.status(), "applied");
    assert_eq!(debit.balance(), 50);

    let balance = engine.queries().balance(&account).await.expect("balance");
    assert_eq!(balance, 50);
}

pub async fn test_replay_returns_stored_entry(storage: &Storage) {
    let engine = engine(storage);
    let account = unique("replay");
    let token = unique("tok");

    let first = engine.apply(&account, &token, 42).await.expect("first");
    let second = engine.apply(&account, &token, 42).await.expect("second");

    assert!(second.is_replay());
    assert_eq!(first.entry(), second.entry());

    let page = engine
        .queries()
        .history(&account, 10, None)
        .await
        .expect("history");
    assert_eq!(page.entries.len(), 1, "replay must not write a row");
}

pub async fn test_entry_round_trips_through_storage(storage: &Storage) {
    let engine = engine(storage);
    let account = unique("audit");
    let token = unique("tok");

    let applied = engine.apply(&account, &token, 7).await.expect("apply");
    let stored = engine
        .queries()
        .entry(&token)
        .await
        .expect("entry")
        .expect("entry should exist");

    assert_eq!(&stored, applied.entry());
    assert_eq!(stored.status, EntryStatus::Applied);
    assert_eq!(stored.sequence, 1);
}

pub async fn test_token_reuse_with_different_parameters(storage: &Storage) {
    let engine = engine(storage);
    let account = unique("conflict");
    let token = unique("tok");

    engine.apply(&account, &token, 10).await.expect("apply");
    let err = engine
        .apply(&account, &token, 11)
        .await
        .expect_err("different amount must conflict");
    assert!(matches!(err, LedgerError::TokenConflict { .. }));

    let other = unique("other");
    let err = engine
        .apply(&other, &token, 10)
        .await
        .expect_err("different account must conflict");
    assert!(matches!(err, LedgerError::TokenConflict { .. }));
}

pub async fn test_keys_are_case_sensitive(storage: &Storage) {
    let engine = engine(storage);
    let lower = unique("case");
    let upper = lower.to_uppercase();
    let token = unique("tok");

    let credit = engine.apply(&lower, &token, 100).await.expect("credit");
    assert_eq!(credit.status(), "applied");

    let debit = engine
        .apply(&upper, &unique("debit"), -50)
        .await
        .expect("debit");
    assert_eq!(debit.status(), "rejected", "{} must not share {}'s funds", upper, lower);
    assert_eq!(debit.balance(), 0);

    let other = engine
        .apply(&lower, &token.to_uppercase(), 100)
        .await
        .expect("token differing only in case is a new token");
    assert_eq!(other.status(), "applied");
    assert_eq!(other.balance(), 200);

    assert_eq!(engine.queries().balance(&lower).await.expect("balance"), 200);
    assert_eq!(engine.queries().balance(&upper).await.expect("balance"), 0);
}

pub async fn test_unknown_account_reads(storage: &Storage) {
    let engine = engine(storage);
    let account = unique("nobody");

    assert_eq!(engine.queries().balance(&account).await.expect("balance"), 0);
    let page = engine
        .queries()
        .history(&account, 10, None)
        .await
        .expect("history");
    assert!(page.entries.is_empty());
    assert!(page.next_cursor.is_none());
}

pub async fn test_history_pagination(storage: &Storage) {
    let engine = engine(storage);
    let account = unique("history");
    let tokens: Vec<String> = (0..5).map(|i| unique(&format!("h{}", i))).collect();
    for token in &tokens {
        engine.apply(&account, token, 10).await.expect("apply");
    }

    let queries = engine.queries();
    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = queries
            .history(&account, 2, cursor.as_deref())
            .await
            .expect("history");
        seen.extend(page.entries.iter().map(|e| e.sequence));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(seen, vec![5, 4, 3, 2, 1]);

    let again = queries
        .history(&account, 2, Some(&tokens[2]))
        .await
        .expect("history");
    let seqs: Vec<i64> = again.entries.iter().map(|e| e.sequence).collect();
    assert_eq!(seqs, vec![2, 1]);
}

pub async fn test_schema_is_idempotent(storage: &Storage) {
    storage
        .schema
        .ensure_tables_exist()
        .await
        .expect("second ensure_tables_exist should succeed");
}

// =============================================================================
// Concurrency
// =============================================================================

pub async fn test_concurrent_distinct_tokens(storage: &Storage) {
    const N: i64 = 20;
    let engine = engine(storage);
    let account = unique("concurrent");

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let engine = engine.clone();
            let account = account.clone();
            let token = unique(&format!("c{}", i));
            tokio::spawn(async move { engine.apply(&account, &token, i + 1).await })
        })
        .collect();

    for handle in futures::future::join_all(handles).await {
        let outcome = handle.expect("task panicked").expect("apply");
        assert!(matches!(outcome, ApplyOutcome::Applied(_)));
    }

    let page = engine
        .queries()
        .history(&account, 100, None)
        .await
        .expect("history");
    let mut seqs: Vec<i64> = page.entries.iter().map(|e| e.sequence).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=N).collect::<Vec<_>>(), "no gaps, no duplicates");

    let previous: HashSet<i64> = page.entries.iter().map(|e| e.previous_balance()).collect();
    assert_eq!(previous.len() as i64, N, "no two entries share a previous balance");

    let balance = engine.queries().balance(&account).await.expect("balance");
    assert_eq!(balance, N * (N + 1) / 2);
}

pub async fn test_concurrent_same_token(storage: &Storage) {
    let engine = engine(storage);
    let account = unique("same-token");
    let token = unique("tok");

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let engine = engine.clone();
            let account = account.clone();
            let token = token.clone();
            tokio::spawn(async move { engine.apply(&account, &token, 25).await })
        })
        .collect();

    let mut applied = 0;
    for handle in futures::future::join_all(handles).await {
        let outcome = handle.expect("task panicked").expect("apply");
        assert_eq!(outcome.balance(), 25);
        if !outcome.is_replay() {
            applied += 1;
        }
    }
    assert_eq!(applied, 1, "exactly one request applies the credit");

    let balance = engine.queries().balance(&account).await.expect("balance");
    assert_eq!(balance, 25);
}

pub async fn test_concurrent_same_token_across_accounts(storage: &Storage) {
    let engine = engine(storage);
    let token = unique("tok");
    let accounts: Vec<String> = (0..8).map(|i| unique(&format!("spread{}", i))).collect();

    let handles: Vec<_> = accounts
        .iter()
        .map(|account| {
            let engine = engine.clone();
            let account = account.clone();
            let token = token.clone();
            tokio::spawn(async move { engine.apply(&account, &token, 30).await })
        })
        .collect();

    let mut applied = 0;
    let mut conflicts = 0;
    for handle in futures::future::join_all(handles).await {
        match handle.expect("task panicked") {
            Ok(ApplyOutcome::Applied(_)) => applied += 1,
            Err(LedgerError::TokenConflict { .. }) => conflicts += 1,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert_eq!(applied, 1, "exactly one account receives the credit");
    assert_eq!(conflicts, accounts.len() - 1);

    let stored = engine
        .queries()
        .entry(&token)
        .await
        .expect("entry")
        .expect("winning entry should exist");
    let mut total = 0;
    for account in &accounts {
        total += engine.queries().balance(account).await.expect("balance");
    }
    assert_eq!(total, 30);
    assert_eq!(
        engine.queries().balance(&stored.account_key).await.expect("balance"),
        30
    );
}

pub async fn test_concurrent_debits_never_overdraw(storage: &Storage) {
    let engine = engine(storage);
    let account = unique("overdraw");
    engine
        .apply(&account, &unique("seed"), 100)
        .await
        .expect("seed credit");

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let engine = engine.clone();
            let account = account.clone();
            let token = unique(&format!("d{}", i));
            tokio::spawn(async move { engine.apply(&account, &token, -10).await })
        })
        .collect();

    let mut applied = 0;
    let mut rejected = 0;
    for handle in futures::future::join_all(handles).await {
        match handle.expect("task panicked").expect("apply") {
            ApplyOutcome::Applied(entry) => {
                assert!(entry.balance >= 0);
                applied += 1;
            }
            ApplyOutcome::Rejected { entry, .. } => {
                assert_eq!(entry.balance, 0);
                rejected += 1;
            }
            ApplyOutcome::Replayed(_) => panic!("distinct tokens must not replay"),
        }
    }
    assert_eq!(applied, 10);
    assert_eq!(rejected, 10);

    let balance = engine.queries().balance(&account).await.expect("balance");
    assert_eq!(balance, 0);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all ledger contract tests against initialized storage.
#[macro_export]
macro_rules! run_ledger_tests {
    ($storage:expr) => {
        use $crate::ledger::ledger_tests::*;

        test_credit_reject_replay_debit($storage).await;
        println!("  test_credit_reject_replay_debit: PASSED");

        test_replay_returns_stored_entry($storage).await;
        println!("  test_replay_returns_stored_entry: PASSED");

        test_entry_round_trips_through_storage($storage).await;
        println!("  test_entry_round_trips_through_storage: PASSED");

        test_token_reuse_with_different_parameters($storage).await;
        println!("  test_token_reuse_with_different_parameters: PASSED");

        test_keys_are_case_sensitive($storage).await;
        println!("  test_keys_are_case_sensitive: PASSED");

        test_unknown_account_reads($storage).await;
        println!("  test_unknown_account_reads: PASSED");

        test_history_pagination($storage).await;
        println!("  test_history_pagination: PASSED");

        test_schema_is_idempotent($storage).await;
        println!("  test_schema_is_idempotent: PASSED");

        test_concurrent_distinct_tokens($storage).await;
        println!("  test_concurrent_distinct_tokens: PASSED");

        test_concurrent_same_token($storage).await;
        println!("  test_concurrent_same_token: PASSED");

        test_concurrent_same_token_across_accounts($storage).await;
        println!("  test_concurrent_same_token_across_accounts: PASSED");

        test_concurrent_debits_never_overdraw($storage).await;
        println!("  test_concurrent_debits_never_overdraw: PASSED");
    };
}
