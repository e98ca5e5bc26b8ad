//! airtime-ledger: operator command line
//!
//! Runs one ledger operation against the configured backend and prints the
//! JSON response to stdout.
//!
//! ## Usage
//! ```text
//! airtime-ledger provision
//! airtime-ledger teardown
//! airtime-ledger balance <account_key>
//! airtime-ledger history <account_key> [limit] [before_token]
//! airtime-ledger apply <account_key> <token> <amount>
//! airtime-ledger audit <token>
//! ```
//!
//! ## Configuration
//! - AIRTIME_CONFIG: path to a YAML config file (optional)
//! - AIRTIME__STORAGE__TYPE etc.: per-key overrides
//! - AIRTIME_LOG: log filter (default: info)

use std::process::ExitCode;

use tracing::{error, info};

use airtime_ledger::api::{self, HistoryQuery, LedgerApi, TransactionRequest};
use airtime_ledger::config::Config;
use airtime_ledger::ledger::LedgerEngine;
use airtime_ledger::storage::init_storage;
use airtime_ledger::utils::bootstrap::init_tracing;

const USAGE: &str = "usage: airtime-ledger <provision|teardown|balance|history|apply|audit> [args...]";

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "airtime-ledger failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::from(2));
    };

    let config = Config::load(None)?;
    let storage = init_storage(&config.storage).await?;

    let api = LedgerApi::new(LedgerEngine::new(storage.ledger.clone(), config.ledger.clone()));

    let (status, body) = match (command.as_str(), &args[1..]) {
        ("provision", []) => {
            info!("ledger schema provisioned");
            return Ok(ExitCode::SUCCESS);
        }
        ("teardown", []) => {
            storage.schema.drop_tables().await?;
            return Ok(ExitCode::SUCCESS);
        }
        ("balance", [account_key]) => api::render(api.balance(account_key).await),
        ("history", [account_key, rest @ ..]) if rest.len() <= 2 => {
            let limit = match rest.first() {
                Some(limit) => Some(limit.parse::<u32>()?),
                None => None,
            };
            let query = HistoryQuery {
                limit,
                before_token: rest.get(1).cloned(),
            };
            api::render(api.history(account_key, query).await)
        }
        ("apply", [account_key, token, amount]) => {
            let request = TransactionRequest {
                account_key: account_key.clone(),
                token: token.clone(),
                amount: amount.parse()?,
            };
            api::render(api.transaction(request).await)
        }
        ("audit", [token]) => api::render(api.audit(token).await),
        _ => {
            eprintln!("{}", USAGE);
            return Ok(ExitCode::from(2));
        }
    };

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(if status == 200 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
