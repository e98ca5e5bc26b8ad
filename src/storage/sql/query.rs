//! SQL database abstraction trait.

use sea_query::{
    IndexCreateStatement, InsertStatement, SelectStatement, TableCreateStatement,
    TableDropStatement,
};
use sea_query_binder::SqlxValues;
use sqlx::error::DatabaseError;

use crate::storage::StorageError;

/// Trait for SQL database backends.
///
/// This trait abstracts over different SQL databases (PostgreSQL, SQLite,
/// MySQL) by providing the driver type, query building, and the backend's
/// error vocabulary. The ledger algorithm is the same everywhere; only the
/// lock primitive and error codes differ.
pub trait SqlDatabase: Send + Sync + 'static {
    /// The sqlx driver for this database.
    type Driver: sqlx::Database;

    /// Backend name for logs.
    const NAME: &'static str;

    /// Whether `SELECT ... FOR UPDATE` row locks are available. Backends
    /// without them serialize writers at the database level instead.
    const ROW_LOCKS: bool;

    /// Whether `CREATE INDEX IF NOT EXISTS` is supported.
    const INDEX_IF_NOT_EXISTS: bool;

    /// Collation for key columns when the default one is not binary.
    const KEY_COLLATION: Option<&'static str>;

    /// Build a parameterized SELECT.
    fn build_select(stmt: SelectStatement) -> (String, SqlxValues);

    /// Build a parameterized INSERT.
    fn build_insert(stmt: InsertStatement) -> (String, SqlxValues);

    fn build_table_create(stmt: TableCreateStatement) -> String;

    fn build_table_drop(stmt: TableDropStatement) -> String;

    fn build_index_create(stmt: IndexCreateStatement) -> String;

    /// Serialization failure, deadlock, lock timeout or busy database.
    fn is_write_conflict(err: &(dyn DatabaseError + 'static)) -> bool;

    /// Server-side report that the connection or server went away.
    fn is_unavailable(err: &(dyn DatabaseError + 'static)) -> bool;

    /// DDL hit an object that already exists.
    fn is_duplicate_object(err: &(dyn DatabaseError + 'static)) -> bool;
}

/// Map a sqlx error onto the storage error vocabulary.
pub fn classify<DB: SqlDatabase>(err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            StorageError::DuplicateKey(db.message().to_string())
        }
        sqlx::Error::Database(ref db) if DB::is_write_conflict(&**db) => {
            StorageError::WriteConflict(db.message().to_string())
        }
        sqlx::Error::Database(ref db) if DB::is_unavailable(&**db) => {
            StorageError::Unavailable(db.message().to_string())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StorageError::Unavailable(err.to_string()),
        other => StorageError::Database(other),
    }
}
