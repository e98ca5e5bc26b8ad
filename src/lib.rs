//! Airtime Ledger - idempotent credit/debit ledger
//!
//! Records airtime credits and debits against named accounts over SQLite,
//! PostgreSQL or MySQL, applying each request token exactly once and keeping
//! a consistent running balance under concurrent access.

pub mod api;
pub mod config;
pub mod ledger;
pub mod storage;
pub mod utils;
