//! Shared ledger contract tests.
//!
//! Every SQL backend must give the ledger the same observable behavior.
//! Each backend test binary sets up its storage and runs these tests.

pub mod ledger_tests;
