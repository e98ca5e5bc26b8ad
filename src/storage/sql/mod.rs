//! Unified SQL storage implementations.
//!
//! This module provides shared implementations for SQL-based storage backends
//! (PostgreSQL, SQLite, MySQL). The implementations are parameterized by
//! database type using the `SqlDatabase` trait.
//!
//! Per-account serialization:
//! - PostgreSQL / MySQL: the account row is upserted then locked with
//!   `SELECT ... FOR UPDATE`
//! - SQLite: no row locks; the upsert is the transaction's first statement
//!   and takes the database write lock, so writers run one at a time

mod ledger_store;
mod query;
mod schema_manager;

pub use ledger_store::{SqlLedgerStore, SqlLedgerTransaction};
pub use query::{classify, SqlDatabase};
pub use schema_manager::SqlSchemaManager;

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use sea_query::PostgresQueryBuilder;
    use sea_query_binder::{SqlxBinder, SqlxValues};
    use sqlx::error::DatabaseError;

    /// PostgreSQL database marker type.
    pub struct Postgres;

    impl super::SqlDatabase for Postgres {
        type Driver = sqlx::Postgres;

        const NAME: &'static str = "postgres";
        const ROW_LOCKS: bool = true;
        const INDEX_IF_NOT_EXISTS: bool = true;
        const KEY_COLLATION: Option<&'static str> = None;

        fn build_select(stmt: sea_query::SelectStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(PostgresQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(PostgresQueryBuilder)
        }

        fn build_table_create(stmt: sea_query::TableCreateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_table_drop(stmt: sea_query::TableDropStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_index_create(stmt: sea_query::IndexCreateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn is_write_conflict(err: &(dyn DatabaseError + 'static)) -> bool {
            // serialization_failure, deadlock_detected, lock_not_available
            matches!(err.code().as_deref(), Some("40001" | "40P01" | "55P03"))
        }

        fn is_unavailable(err: &(dyn DatabaseError + 'static)) -> bool {
            // connection_exception class, admin/crash shutdown, cannot_connect_now
            match err.code() {
                Some(code) => code.starts_with("08") || matches!(&*code, "57P01" | "57P02" | "57P03"),
                None => false,
            }
        }

        fn is_duplicate_object(err: &(dyn DatabaseError + 'static)) -> bool {
            // duplicate_table (also raised for indexes), duplicate_object
            matches!(err.code().as_deref(), Some("42P07" | "42710"))
        }
    }

    /// PostgreSQL ledger store.
    pub type PostgresLedgerStore = super::SqlLedgerStore<Postgres>;

    /// PostgreSQL schema manager.
    pub type PostgresSchemaManager = super::SqlSchemaManager<Postgres>;
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite database backend.

    use std::str::FromStr;
    use std::time::Duration;

    use sea_query::SqliteQueryBuilder;
    use sea_query_binder::{SqlxBinder, SqlxValues};
    use sqlx::error::DatabaseError;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use sqlx::SqlitePool;
    use tracing::debug;

    use crate::config::SqliteConfig;

    /// SQLite database marker type.
    pub struct Sqlite;

    impl super::SqlDatabase for Sqlite {
        type Driver = sqlx::Sqlite;

        const NAME: &'static str = "sqlite";
        const ROW_LOCKS: bool = false;
        const INDEX_IF_NOT_EXISTS: bool = true;
        const KEY_COLLATION: Option<&'static str> = None;

        fn build_select(stmt: sea_query::SelectStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(SqliteQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(SqliteQueryBuilder)
        }

        fn build_table_create(stmt: sea_query::TableCreateStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_table_drop(stmt: sea_query::TableDropStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_index_create(stmt: sea_query::IndexCreateStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn is_write_conflict(err: &(dyn DatabaseError + 'static)) -> bool {
            // SQLITE_BUSY = 5, SQLITE_LOCKED = 6
            matches!(primary_code(err), Some(5 | 6))
        }

        fn is_unavailable(err: &(dyn DatabaseError + 'static)) -> bool {
            // SQLITE_IOERR = 10, SQLITE_CANTOPEN = 14
            matches!(primary_code(err), Some(10 | 14))
        }

        fn is_duplicate_object(err: &(dyn DatabaseError + 'static)) -> bool {
            err.message().contains("already exists")
        }
    }

    /// Extended result codes carry the primary code in the low byte.
    fn primary_code(err: &(dyn DatabaseError + 'static)) -> Option<i32> {
        err.code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| code & 0xff)
    }

    /// SQLite ledger store.
    pub type SqliteLedgerStore = super::SqlLedgerStore<Sqlite>;

    /// SQLite schema manager.
    pub type SqliteSchemaManager = super::SqlSchemaManager<Sqlite>;

    /// Open a SQLite pool for the ledger.
    ///
    /// In-memory databases live only as long as their connection, so they get
    /// exactly one connection that is never recycled. That connection is also
    /// the single writer. File databases use WAL and a busy timeout.
    pub async fn connect(config: &SqliteConfig, max_connections: u32) -> sqlx::Result<SqlitePool> {
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);

        if config.is_in_memory() {
            debug!("opening in-memory sqlite ledger");
            let options = SqliteConnectOptions::from_str("sqlite::memory:")?.busy_timeout(busy_timeout);
            return SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await;
        }

        if let Some(parent) = std::path::Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        debug!(path = %config.path, "opening sqlite ledger");
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);

        SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
    }
}

#[cfg(feature = "mysql")]
pub mod mysql {
    //! MySQL database backend (InnoDB).

    use sea_query::MysqlQueryBuilder;
    use sea_query_binder::{SqlxBinder, SqlxValues};
    use sqlx::error::DatabaseError;
    use sqlx::mysql::MySqlDatabaseError;

    /// MySQL database marker type.
    pub struct Mysql;

    impl super::SqlDatabase for Mysql {
        type Driver = sqlx::MySql;

        const NAME: &'static str = "mysql";
        const ROW_LOCKS: bool = true;
        const INDEX_IF_NOT_EXISTS: bool = false;
        // The default utf8mb4_0900_ai_ci folds case and accents.
        const KEY_COLLATION: Option<&'static str> = Some("utf8mb4_bin");

        fn build_select(stmt: sea_query::SelectStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(MysqlQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(MysqlQueryBuilder)
        }

        fn build_table_create(stmt: sea_query::TableCreateStatement) -> String {
            stmt.to_string(MysqlQueryBuilder)
        }

        fn build_table_drop(stmt: sea_query::TableDropStatement) -> String {
            stmt.to_string(MysqlQueryBuilder)
        }

        fn build_index_create(stmt: sea_query::IndexCreateStatement) -> String {
            stmt.to_string(MysqlQueryBuilder)
        }

        fn is_write_conflict(err: &(dyn DatabaseError + 'static)) -> bool {
            // ER_LOCK_WAIT_TIMEOUT, ER_LOCK_DEADLOCK
            err.try_downcast_ref::<MySqlDatabaseError>()
                .map(|e| matches!(e.number(), 1205 | 1213))
                .unwrap_or(false)
        }

        fn is_unavailable(err: &(dyn DatabaseError + 'static)) -> bool {
            // ER_CON_COUNT_ERROR, ER_SERVER_SHUTDOWN
            err.try_downcast_ref::<MySqlDatabaseError>()
                .map(|e| matches!(e.number(), 1040 | 1053))
                .unwrap_or(false)
        }

        fn is_duplicate_object(err: &(dyn DatabaseError + 'static)) -> bool {
            // ER_TABLE_EXISTS_ERROR, ER_DUP_KEYNAME
            err.try_downcast_ref::<MySqlDatabaseError>()
                .map(|e| matches!(e.number(), 1050 | 1061))
                .unwrap_or(false)
        }
    }

    /// MySQL ledger store.
    pub type MysqlLedgerStore = super::SqlLedgerStore<Mysql>;

    /// MySQL schema manager.
    pub type MysqlSchemaManager = super::SqlSchemaManager<Mysql>;
}
