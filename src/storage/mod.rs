//! Storage implementations.
//!
//! The ledger engine talks to storage through two narrow traits:
//! - [`LedgerStore`]: transaction-log reads plus a way to open a transaction
//! - [`LedgerTransaction`]: the read-modify-write primitives used by `apply`
//!
//! SQL backends (SQLite, PostgreSQL, MySQL) share one implementation in
//! [`sql`], parameterized by the [`sql::SqlDatabase`] trait.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::ledger::LedgerEntry;

pub mod schema;
pub mod sql;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockLedgerStore;

#[cfg(feature = "mysql")]
pub use sql::mysql::{MysqlLedgerStore, MysqlSchemaManager};
#[cfg(feature = "postgres")]
pub use sql::postgres::{PostgresLedgerStore, PostgresSchemaManager};
#[cfg(feature = "sqlite")]
pub use sql::sqlite::{SqliteLedgerStore, SqliteSchemaManager};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Backend errors are classified so the ledger can tell retryable
/// contention apart from hard failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A concurrent transaction invalidated this one (serialization
    /// failure, deadlock, lock wait timeout, busy database).
    #[error("Write conflict: {0}")]
    WriteConflict(String),

    /// A uniqueness constraint rejected an insert.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The backend could not be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded into a ledger entry.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, StorageError::WriteConflict(_))
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StorageError::DuplicateKey(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

/// Transaction-log access used by the ledger engine and query service.
///
/// Implementations:
/// - `SqliteLedgerStore`: SQLite (in-memory or file), single-writer locking
/// - `PostgresLedgerStore`: PostgreSQL, row-level `FOR UPDATE` locking
/// - `MysqlLedgerStore`: MySQL/InnoDB, row-level `FOR UPDATE` locking
/// - `MockLedgerStore`: in-process store with fault injection for tests
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Open a storage transaction.
    ///
    /// Dropping the returned transaction without committing rolls it back.
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>>;

    /// Find the entry recorded for an idempotency token.
    async fn find_by_token(&self, token: &str) -> Result<Option<LedgerEntry>>;

    /// Latest entry (highest sequence) for an account.
    async fn latest_entry(&self, account_key: &str) -> Result<Option<LedgerEntry>>;

    /// Entries for an account in descending sequence order.
    ///
    /// When `before_sequence` is set only entries with a lower sequence are
    /// returned.
    async fn history(
        &self,
        account_key: &str,
        limit: u32,
        before_sequence: Option<i64>,
    ) -> Result<Vec<LedgerEntry>>;
}

/// One open storage transaction.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Take exclusive access to an account, creating its row on first use.
    ///
    /// Held until commit or rollback.
    async fn lock_account(&mut self, account_key: &str) -> Result<()>;

    /// Find the entry recorded for a token, as seen by this transaction.
    async fn find_by_token(&mut self, token: &str) -> Result<Option<LedgerEntry>>;

    /// Latest entry for an account, as seen by this transaction.
    async fn latest_entry(&mut self, account_key: &str) -> Result<Option<LedgerEntry>>;

    /// Append an entry to the log.
    async fn insert_entry(&mut self, entry: &LedgerEntry) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Provisions and tears down the ledger tables.
///
/// Both operations are idempotent.
#[async_trait]
pub trait SchemaManager: Send + Sync {
    async fn ensure_tables_exist(&self) -> Result<()>;

    async fn drop_tables(&self) -> Result<()>;
}

/// Storage handles produced by [`init_storage`].
#[derive(Clone)]
pub struct Storage {
    pub ledger: Arc<dyn LedgerStore>,
    pub schema: Arc<dyn SchemaManager>,
}

/// Initialize storage based on configuration.
///
/// Connects the configured backend and provisions the ledger tables.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<Storage, Box<dyn std::error::Error + Send + Sync>> {
    info!(storage_type = ?config.storage_type, "initializing storage");

    let storage = match config.storage_type {
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            let pool = sql::sqlite::connect(&config.sqlite, config.max_connections).await?;
            Storage {
                ledger: Arc::new(SqliteLedgerStore::new(pool.clone())),
                schema: Arc::new(SqliteSchemaManager::new(pool)),
            }
        }
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&config.postgres.uri)
                .await?;
            Storage {
                ledger: Arc::new(PostgresLedgerStore::new(pool.clone())),
                schema: Arc::new(PostgresSchemaManager::new(pool)),
            }
        }
        #[cfg(feature = "mysql")]
        StorageType::Mysql => {
            let pool = sqlx::mysql::MySqlPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&config.mysql.uri)
                .await?;
            Storage {
                ledger: Arc::new(MysqlLedgerStore::new(pool.clone())),
                schema: Arc::new(MysqlSchemaManager::new(pool)),
            }
        }
        #[allow(unreachable_patterns)]
        ref other => {
            tracing::error!(storage_type = ?other, "storage backend not compiled in");
            return Err(format!("storage type {:?} requires its cargo feature", other).into());
        }
    };

    storage.schema.ensure_tables_exist().await?;
    info!(backend = storage.ledger.backend(), "ledger tables ready");

    Ok(storage)
}
