//! Unified SQL SchemaManager implementation.

use std::marker::PhantomData;

use tracing::{debug, info};

use super::SqlDatabase;
use crate::storage::schema;

/// Creates and drops the ledger tables on a SQL backend.
pub struct SqlSchemaManager<DB: SqlDatabase> {
    pool: sqlx::Pool<DB::Driver>,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlSchemaManager<DB> {
    pub fn new(pool: sqlx::Pool<DB::Driver>) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }
}

macro_rules! impl_schema_manager {
    ($db_type:ty, $driver:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::SchemaManager for SqlSchemaManager<$db_type> {
            async fn ensure_tables_exist(&self) -> crate::storage::Result<()> {
                let collation = <$db_type as SqlDatabase>::KEY_COLLATION;
                for stmt in [
                    schema::create_accounts_table(collation),
                    schema::create_transactions_table(collation),
                ] {
                    let sql = <$db_type>::build_table_create(stmt);
                    sqlx::query::<$driver>(&sql)
                        .execute(&self.pool)
                        .await
                        .map_err(super::classify::<$db_type>)?;
                }

                let mut index = schema::create_account_created_index();
                if <$db_type as SqlDatabase>::INDEX_IF_NOT_EXISTS {
                    index.if_not_exists();
                }
                let sql = <$db_type>::build_index_create(index);
                match sqlx::query::<$driver>(&sql).execute(&self.pool).await {
                    Ok(_) => {}
                    Err(sqlx::Error::Database(e)) if <$db_type>::is_duplicate_object(&*e) => {
                        debug!(index = schema::ACCOUNT_CREATED_INDEX, "index already exists");
                    }
                    Err(e) => return Err(super::classify::<$db_type>(e)),
                }

                info!(
                    backend = <$db_type as SqlDatabase>::NAME,
                    "ledger tables ensured"
                );
                Ok(())
            }

            async fn drop_tables(&self) -> crate::storage::Result<()> {
                for stmt in schema::drop_tables() {
                    let sql = <$db_type>::build_table_drop(stmt);
                    sqlx::query::<$driver>(&sql)
                        .execute(&self.pool)
                        .await
                        .map_err(super::classify::<$db_type>)?;
                }

                info!(
                    backend = <$db_type as SqlDatabase>::NAME,
                    "ledger tables dropped"
                );
                Ok(())
            }
        }
    };
}

impl_schema_manager!(super::postgres::Postgres, sqlx::Postgres, "postgres");
impl_schema_manager!(super::sqlite::Sqlite, sqlx::Sqlite, "sqlite");
impl_schema_manager!(super::mysql::Mysql, sqlx::MySql, "mysql");
