use std::sync::Arc;

use super::*;
use crate::config::Config;
use crate::ledger::LedgerEngine;
use crate::storage::MockLedgerStore;

async fn seeded(amounts: &[i64]) -> (AccountQueryService, Arc<MockLedgerStore>) {
    let store = Arc::new(MockLedgerStore::new());
    let engine = LedgerEngine::new(store.clone(), Config::for_test().ledger);
    for (i, amount) in amounts.iter().enumerate() {
        engine
            .apply("A", &format!("t{}", i + 1), *amount)
            .await
            .unwrap();
    }
    (engine.queries(), store)
}

#[tokio::test]
async fn test_unknown_account_has_zero_balance() {
    let (queries, _store) = seeded(&[]).await;
    assert_eq!(queries.balance("nobody").await.unwrap(), 0);
}

#[tokio::test]
async fn test_balance_ignores_rejected_entries() {
    let (queries, _store) = seeded(&[100, -150, -30]).await;
    assert_eq!(queries.balance("A").await.unwrap(), 70);
}

#[tokio::test]
async fn test_balance_rejects_empty_account() {
    let (queries, _store) = seeded(&[]).await;
    assert!(matches!(
        queries.balance("").await,
        Err(LedgerError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_history_pages_newest_first() {
    let (queries, _store) = seeded(&[10, 20, 30, 40, 50]).await;

    let first = queries.history("A", 2, None).await.unwrap();
    let tokens: Vec<&str> = first.entries.iter().map(|e| e.token.as_str()).collect();
    assert_eq!(tokens, vec!["t5", "t4"]);
    assert_eq!(first.next_cursor.as_deref(), Some("t4"));

    let second = queries
        .history("A", 2, first.next_cursor.as_deref())
        .await
        .unwrap();
    let tokens: Vec<&str> = second.entries.iter().map(|e| e.token.as_str()).collect();
    assert_eq!(tokens, vec!["t3", "t2"]);

    let last = queries
        .history("A", 2, second.next_cursor.as_deref())
        .await
        .unwrap();
    assert_eq!(last.entries.len(), 1);
    assert_eq!(last.entries[0].token, "t1");
    assert!(last.next_cursor.is_none());
}

#[tokio::test]
async fn test_history_cursor_is_restartable() {
    let (queries, store) = seeded(&[10, 20, 30]).await;

    let before = queries.history("A", 10, Some("t3")).await.unwrap();

    LedgerEngine::new(store, Config::for_test().ledger)
        .apply("A", "t4", 5)
        .await
        .unwrap();

    let again = queries.history("A", 10, Some("t3")).await.unwrap();
    assert_eq!(before, again);
}

#[tokio::test]
async fn test_history_limit_bounds() {
    let (queries, _store) = seeded(&[10]).await;

    for limit in [0, MAX_HISTORY_LIMIT + 1] {
        assert!(matches!(
            queries.history("A", limit, None).await,
            Err(LedgerError::InvalidRequest(_))
        ));
    }
    assert!(queries.history("A", MAX_HISTORY_LIMIT, None).await.is_ok());
}

#[tokio::test]
async fn test_history_rejects_foreign_or_unknown_cursor() {
    let (queries, store) = seeded(&[10]).await;
    LedgerEngine::new(store, Config::for_test().ledger)
        .apply("B", "b1", 10)
        .await
        .unwrap();

    assert!(matches!(
        queries.history("A", 10, Some("b1")).await,
        Err(LedgerError::InvalidRequest(_))
    ));
    assert!(matches!(
        queries.history("A", 10, Some("missing")).await,
        Err(LedgerError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_entry_lookup_by_token() {
    let (queries, _store) = seeded(&[10, -50]).await;

    let rejected = queries.entry("t2").await.unwrap().unwrap();
    assert_eq!(rejected.status, crate::ledger::EntryStatus::Rejected);
    assert_eq!(rejected.balance, 10);
    assert!(queries.entry("t9").await.unwrap().is_none());
}

#[tokio::test]
async fn test_reads_surface_unavailable_storage() {
    let (queries, store) = seeded(&[10]).await;
    store.set_unavailable(true).await;

    assert!(matches!(
        queries.balance("A").await,
        Err(LedgerError::StorageUnavailable(_))
    ));
}
