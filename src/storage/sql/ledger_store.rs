//! Unified SQL LedgerStore implementation.
//!
//! Uses a macro to generate implementations for each SQL backend,
//! eliminating code duplication while maintaining type safety.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use sea_query::{Expr, InsertStatement, LockType, OnConflict, Order, Query, SelectStatement};
use sqlx::{ColumnIndex, Decode, Row, Type};

use super::SqlDatabase;
use crate::ledger::{EntryStatus, LedgerEntry};
use crate::storage::schema::{Accounts, Transactions, ENTRY_COLUMNS};
use crate::storage::{Result, StorageError};

/// SQL-based implementation of LedgerStore.
///
/// This generic implementation works with any SQL database that implements
/// the `SqlDatabase` trait (PostgreSQL, SQLite, MySQL).
pub struct SqlLedgerStore<DB: SqlDatabase> {
    pool: sqlx::Pool<DB::Driver>,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlLedgerStore<DB> {
    /// Create a new SQL ledger store with the given pool.
    pub fn new(pool: sqlx::Pool<DB::Driver>) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &sqlx::Pool<DB::Driver> {
        &self.pool
    }
}

/// An open SQL transaction.
///
/// Wraps `sqlx::Transaction`, which rolls back when dropped uncommitted.
pub struct SqlLedgerTransaction<DB: SqlDatabase> {
    tx: sqlx::Transaction<'static, DB::Driver>,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlLedgerTransaction<DB> {
    fn new(tx: sqlx::Transaction<'static, DB::Driver>) -> Self {
        Self {
            tx,
            _marker: PhantomData,
        }
    }
}

fn select_entries() -> SelectStatement {
    Query::select()
        .columns(ENTRY_COLUMNS)
        .from(Transactions::Table)
        .to_owned()
}

pub(super) fn select_by_token(token: &str) -> SelectStatement {
    select_entries()
        .and_where(Expr::col(Transactions::Token).eq(token))
        .to_owned()
}

pub(super) fn select_latest(account_key: &str) -> SelectStatement {
    select_entries()
        .and_where(Expr::col(Transactions::AccountKey).eq(account_key))
        .order_by(Transactions::Sequence, Order::Desc)
        .limit(1)
        .to_owned()
}

pub(super) fn select_history(
    account_key: &str,
    limit: u32,
    before_sequence: Option<i64>,
) -> SelectStatement {
    let mut stmt = select_entries()
        .and_where(Expr::col(Transactions::AccountKey).eq(account_key))
        .to_owned();
    if let Some(before) = before_sequence {
        stmt.and_where(Expr::col(Transactions::Sequence).lt(before));
    }
    stmt.order_by(Transactions::Sequence, Order::Desc)
        .limit(u64::from(limit))
        .to_owned()
}

/// Insert the account row, or touch it if it already exists.
///
/// The no-op update keeps the statement portable: it is
/// `ON CONFLICT ... DO UPDATE` on PostgreSQL/SQLite and
/// `ON DUPLICATE KEY UPDATE` on MySQL, and on every engine it leaves the
/// row write-locked by this transaction.
pub(super) fn upsert_account(account_key: &str, created_at: &str) -> InsertStatement {
    Query::insert()
        .into_table(Accounts::Table)
        .columns([Accounts::AccountKey, Accounts::CreatedAt])
        .values_panic([account_key.into(), created_at.into()])
        .on_conflict(
            OnConflict::column(Accounts::AccountKey)
                .update_column(Accounts::AccountKey)
                .to_owned(),
        )
        .to_owned()
}

pub(super) fn select_account_for_update(account_key: &str) -> SelectStatement {
    Query::select()
        .column(Accounts::AccountKey)
        .from(Accounts::Table)
        .and_where(Expr::col(Accounts::AccountKey).eq(account_key))
        .lock(LockType::Update)
        .to_owned()
}

pub(super) fn insert_entry(entry: &LedgerEntry) -> InsertStatement {
    Query::insert()
        .into_table(Transactions::Table)
        .columns(ENTRY_COLUMNS)
        .values_panic([
            entry.token.as_str().into(),
            entry.account_key.as_str().into(),
            entry.sequence.into(),
            entry.amount.into(),
            entry.balance.into(),
            entry.status.as_str().into(),
            entry.created_at.to_rfc3339().into(),
        ])
        .to_owned()
}

/// Decode a transactions row selected with [`ENTRY_COLUMNS`].
pub(super) fn decode_entry<R>(row: &R) -> Result<LedgerEntry>
where
    R: Row,
    for<'c> &'c str: ColumnIndex<R>,
    String: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    i64: for<'r> Decode<'r, R::Database> + Type<R::Database>,
{
    let corrupt = |e: sqlx::Error| StorageError::CorruptRow(e.to_string());

    let status: String = row.try_get("status").map_err(corrupt)?;
    let status = status.parse::<EntryStatus>().map_err(StorageError::CorruptRow)?;

    let created_at: String = row.try_get("created_at").map_err(corrupt)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| StorageError::CorruptRow(format!("created_at {:?}: {}", created_at, e)))?
        .with_timezone(&Utc);

    Ok(LedgerEntry {
        token: row.try_get("token").map_err(corrupt)?,
        account_key: row.try_get("account_key").map_err(corrupt)?,
        sequence: row.try_get("sequence").map_err(corrupt)?,
        amount: row.try_get("amount").map_err(corrupt)?,
        balance: row.try_get("balance").map_err(corrupt)?,
        status,
        created_at,
    })
}

/// Macro to implement LedgerStore and LedgerTransaction for a specific SQL
/// backend.
macro_rules! impl_ledger_store {
    ($db_type:ty, $driver:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::LedgerStore for SqlLedgerStore<$db_type> {
            fn backend(&self) -> &'static str {
                <$db_type as SqlDatabase>::NAME
            }

            async fn begin(
                &self,
            ) -> crate::storage::Result<Box<dyn crate::storage::LedgerTransaction>> {
                let tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(super::classify::<$db_type>)?;
                Ok(Box::new(SqlLedgerTransaction::<$db_type>::new(tx)))
            }

            async fn find_by_token(&self, token: &str) -> crate::storage::Result<Option<LedgerEntry>> {
                let (sql, values) = <$db_type>::build_select(select_by_token(token));
                let row = sqlx::query_with::<$driver, _>(&sql, values)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(super::classify::<$db_type>)?;
                row.map(|row| decode_entry(&row)).transpose()
            }

            async fn latest_entry(
                &self,
                account_key: &str,
            ) -> crate::storage::Result<Option<LedgerEntry>> {
                let (sql, values) = <$db_type>::build_select(select_latest(account_key));
                let row = sqlx::query_with::<$driver, _>(&sql, values)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(super::classify::<$db_type>)?;
                row.map(|row| decode_entry(&row)).transpose()
            }

            async fn history(
                &self,
                account_key: &str,
                limit: u32,
                before_sequence: Option<i64>,
            ) -> crate::storage::Result<Vec<LedgerEntry>> {
                let (sql, values) =
                    <$db_type>::build_select(select_history(account_key, limit, before_sequence));
                let rows = sqlx::query_with::<$driver, _>(&sql, values)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(super::classify::<$db_type>)?;
                rows.iter().map(decode_entry).collect()
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::LedgerTransaction for SqlLedgerTransaction<$db_type> {
            async fn lock_account(&mut self, account_key: &str) -> crate::storage::Result<()> {
                let created_at = Utc::now().to_rfc3339();
                let (sql, values) = <$db_type>::build_insert(upsert_account(account_key, &created_at));
                sqlx::query_with::<$driver, _>(&sql, values)
                    .execute(&mut *self.tx)
                    .await
                    .map_err(super::classify::<$db_type>)?;

                if <$db_type as SqlDatabase>::ROW_LOCKS {
                    let (sql, values) =
                        <$db_type>::build_select(select_account_for_update(account_key));
                    sqlx::query_with::<$driver, _>(&sql, values)
                        .fetch_optional(&mut *self.tx)
                        .await
                        .map_err(super::classify::<$db_type>)?;
                }

                Ok(())
            }

            async fn find_by_token(
                &mut self,
                token: &str,
            ) -> crate::storage::Result<Option<LedgerEntry>> {
                let (sql, values) = <$db_type>::build_select(select_by_token(token));
                let row = sqlx::query_with::<$driver, _>(&sql, values)
                    .fetch_optional(&mut *self.tx)
                    .await
                    .map_err(super::classify::<$db_type>)?;
                row.map(|row| decode_entry(&row)).transpose()
            }

            async fn latest_entry(
                &mut self,
                account_key: &str,
            ) -> crate::storage::Result<Option<LedgerEntry>> {
                let (sql, values) = <$db_type>::build_select(select_latest(account_key));
                let row = sqlx::query_with::<$driver, _>(&sql, values)
                    .fetch_optional(&mut *self.tx)
                    .await
                    .map_err(super::classify::<$db_type>)?;
                row.map(|row| decode_entry(&row)).transpose()
            }

            async fn insert_entry(&mut self, entry: &LedgerEntry) -> crate::storage::Result<()> {
                let (sql, values) = <$db_type>::build_insert(insert_entry(entry));
                sqlx::query_with::<$driver, _>(&sql, values)
                    .execute(&mut *self.tx)
                    .await
                    .map_err(super::classify::<$db_type>)?;
                Ok(())
            }

            async fn commit(self: Box<Self>) -> crate::storage::Result<()> {
                self.tx
                    .commit()
                    .await
                    .map_err(super::classify::<$db_type>)
            }

            async fn rollback(self: Box<Self>) -> crate::storage::Result<()> {
                self.tx
                    .rollback()
                    .await
                    .map_err(super::classify::<$db_type>)
            }
        }
    };
}

// Generate implementations for each SQL backend
impl_ledger_store!(super::postgres::Postgres, sqlx::Postgres, "postgres");
impl_ledger_store!(super::sqlite::Sqlite, sqlx::Sqlite, "sqlite");
impl_ledger_store!(super::mysql::Mysql, sqlx::MySql, "mysql");
