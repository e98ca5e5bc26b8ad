//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building,
//! plus the backend-neutral DDL for the ledger tables.

use sea_query::{
    ColumnDef, Iden, Index, IndexCreateStatement, IndexOrder, IntoIden, Table,
    TableCreateStatement, TableDropStatement,
};

/// Maximum length of account keys and idempotency tokens.
pub const KEY_MAX_LEN: usize = 128;

/// Index backing latest-balance and history lookups.
pub const ACCOUNT_CREATED_INDEX: &str = "idx_transactions_account_created";

/// Accounts table schema.
///
/// One row per account. The row holds no balance; it is the per-account
/// lock target.
#[derive(Iden)]
pub enum Accounts {
    Table,
    #[iden = "account_key"]
    AccountKey,
    #[iden = "created_at"]
    CreatedAt,
}

/// Transactions table schema (the append-only ledger log).
#[derive(Iden)]
pub enum Transactions {
    Table,
    #[iden = "token"]
    Token,
    #[iden = "account_key"]
    AccountKey,
    #[iden = "sequence"]
    Sequence,
    #[iden = "amount"]
    Amount,
    #[iden = "balance"]
    Balance,
    #[iden = "status"]
    Status,
    #[iden = "created_at"]
    CreatedAt,
}

/// Columns selected when reading ledger entries.
pub const ENTRY_COLUMNS: [Transactions; 7] = [
    Transactions::Token,
    Transactions::AccountKey,
    Transactions::Sequence,
    Transactions::Amount,
    Transactions::Balance,
    Transactions::Status,
    Transactions::CreatedAt,
];

/// Key column: bounded string compared byte for byte.
///
/// `collation` is set on backends whose default collation folds case or
/// accents (MySQL), so keys stay opaque everywhere.
fn key_column<T: IntoIden>(name: T, collation: Option<&str>) -> ColumnDef {
    let mut col = ColumnDef::new(name);
    col.string_len(KEY_MAX_LEN as u32).not_null();
    if let Some(collation) = collation {
        col.extra(format!("COLLATE {}", collation));
    }
    col
}

pub fn create_accounts_table(key_collation: Option<&str>) -> TableCreateStatement {
    Table::create()
        .table(Accounts::Table)
        .if_not_exists()
        .col(key_column(Accounts::AccountKey, key_collation).primary_key())
        .col(ColumnDef::new(Accounts::CreatedAt).string_len(40).not_null())
        .to_owned()
}

pub fn create_transactions_table(key_collation: Option<&str>) -> TableCreateStatement {
    Table::create()
        .table(Transactions::Table)
        .if_not_exists()
        .col(key_column(Transactions::Token, key_collation).unique_key())
        .col(key_column(Transactions::AccountKey, key_collation))
        .col(ColumnDef::new(Transactions::Sequence).big_integer().not_null())
        .col(ColumnDef::new(Transactions::Amount).big_integer().not_null())
        .col(ColumnDef::new(Transactions::Balance).big_integer().not_null())
        .col(ColumnDef::new(Transactions::Status).string_len(16).not_null())
        .col(ColumnDef::new(Transactions::CreatedAt).string_len(40).not_null())
        .primary_key(
            Index::create()
                .col(Transactions::AccountKey)
                .col(Transactions::Sequence),
        )
        .to_owned()
}

/// Index on `(account_key, created_at DESC)`.
///
/// `if_not_exists` is left to the caller: MySQL has no
/// `CREATE INDEX IF NOT EXISTS`.
pub fn create_account_created_index() -> IndexCreateStatement {
    Index::create()
        .name(ACCOUNT_CREATED_INDEX)
        .table(Transactions::Table)
        .col(Transactions::AccountKey)
        .col((Transactions::CreatedAt, IndexOrder::Desc))
        .to_owned()
}

/// Drop statements in dependency order.
pub fn drop_tables() -> [TableDropStatement; 2] {
    [
        Table::drop()
            .table(Transactions::Table)
            .if_exists()
            .to_owned(),
        Table::drop().table(Accounts::Table).if_exists().to_owned(),
    ]
}
