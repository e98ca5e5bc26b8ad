//! Service-facing request/response shapes.
//!
//! Transport is left to the embedding service. Handlers take parsed (or raw
//! JSON) requests and return serializable bodies or an [`ApiError`] carrying
//! the status code to send.
//!
//! | Route                                    | Handler                    |
//! |------------------------------------------|----------------------------|
//! | `POST transaction`                       | [`LedgerApi::transaction`] |
//! | `GET balance/{account_key}`              | [`LedgerApi::balance`]     |
//! | `GET history/{account_key}?limit&before_token` | [`LedgerApi::history`] |
//! | `GET audit/{token}`                      | [`LedgerApi::audit`]       |

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::ledger::{
    AccountQueryService, ApplyOutcome, ApplyRequest, LedgerEngine, LedgerEntry, LedgerError,
    DEFAULT_HISTORY_LIMIT,
};

/// Message returned when a body is not a JSON object of the expected shape.
pub const BAD_PARAMETERS_MESSAGE: &str = "Missing/Unexpected request parameters";
/// Message returned for failures the caller cannot act on.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error.";

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionRequest {
    pub account_key: String,
    pub token: String,
    pub amount: i64,
}

impl TransactionRequest {
    pub const FIELDS: [&'static str; 3] = ["account_key", "token", "amount"];
}

/// Reject an object whose keys differ from `expected`, naming the missing
/// keys first and the unexpected ones otherwise. Both lists are sorted.
pub fn check_params(
    params: &serde_json::Map<String, serde_json::Value>,
    expected: &[&str],
) -> Result<(), ApiError> {
    let mut missing: Vec<&str> = expected
        .iter()
        .copied()
        .filter(|name| !params.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(ApiError::bad_request(format!(
            "Missing request parameters: '{}'",
            missing.join("', '")
        )));
    }

    let mut unexpected: Vec<&str> = params
        .keys()
        .map(String::as_str)
        .filter(|name| !expected.contains(name))
        .collect();
    if !unexpected.is_empty() {
        unexpected.sort_unstable();
        return Err(ApiError::bad_request(format!(
            "Unexpected request parameters: '{}'",
            unexpected.join("', '")
        )));
    }
    Ok(())
}

/// Query string of `GET history/{account_key}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub before_token: Option<String>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionResponse {
    /// `applied`, `rejected` or `replayed`.
    pub status: String,
    pub balance: i64,
    pub token: String,
    pub sequence: i64,
}

impl From<ApplyOutcome> for TransactionResponse {
    fn from(outcome: ApplyOutcome) -> Self {
        let status = outcome.status().to_string();
        let entry = outcome.into_entry();
        Self {
            status,
            balance: entry.balance,
            token: entry.token,
            sequence: entry.sequence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceResponse {
    pub account_key: String,
    pub balance: i64,
}

/// A log entry as exposed over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryView {
    pub token: String,
    pub account_key: String,
    pub sequence: i64,
    pub amount: i64,
    pub balance: i64,
    pub status: String,
    /// RFC 3339, UTC.
    pub created_at: String,
}

impl From<LedgerEntry> for EntryView {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            status: entry.status.to_string(),
            created_at: entry.created_at.to_rfc3339(),
            token: entry.token,
            account_key: entry.account_key,
            sequence: entry.sequence,
            amount: entry.amount,
            balance: entry.balance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<EntryView>,
    pub next_before_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditResponse {
    pub entry: EntryView,
}

// ============================================================================
// Errors
// ============================================================================

/// Error body `{"error": ..., "code": ...}` plus the status to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: u16,
    #[serde(rename = "error")]
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: 400,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: 404,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            code: 503,
            message: message.into(),
        }
    }

    pub fn internal() -> Self {
        Self {
            code: 500,
            message: INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidRequest(_) | LedgerError::TokenConflict { .. } => {
                ApiError::bad_request(err.to_string())
            }
            LedgerError::LedgerUnavailable { .. } | LedgerError::StorageUnavailable(_) => {
                ApiError::unavailable(err.to_string())
            }
            LedgerError::Storage(e) => {
                error!(error = %e, "storage failure");
                ApiError::internal()
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(_: serde_json::Error) -> Self {
        ApiError::bad_request(BAD_PARAMETERS_MESSAGE)
    }
}

/// Serialize a handler result into `(status, body)`.
pub fn render<T: Serialize>(result: Result<T, ApiError>) -> (u16, serde_json::Value) {
    let rendered = match result {
        Ok(body) => serde_json::to_value(body).map(|value| (200, value)),
        Err(err) => serde_json::to_value(&err).map(|value| (err.code, value)),
    };
    rendered.unwrap_or_else(|e| {
        error!(error = %e, "failed to serialize response");
        (500, serde_json::json!({ "error": INTERNAL_ERROR_MESSAGE, "code": 500 }))
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// Request handlers over a ledger engine.
#[derive(Clone)]
pub struct LedgerApi {
    engine: LedgerEngine,
    queries: AccountQueryService,
}

impl LedgerApi {
    pub fn new(engine: LedgerEngine) -> Self {
        let queries = engine.queries();
        Self { engine, queries }
    }

    /// `POST transaction`
    pub async fn transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionResponse, ApiError> {
        let request = ApplyRequest::new(request.account_key, request.token, request.amount);
        let outcome = self.engine.apply_request(&request).await?;
        Ok(outcome.into())
    }

    /// `POST transaction` with a raw JSON body.
    pub async fn transaction_json(&self, body: &str) -> Result<TransactionResponse, ApiError> {
        let params: serde_json::Map<String, serde_json::Value> = serde_json::from_str(body)?;
        check_params(&params, &TransactionRequest::FIELDS)?;
        let request: TransactionRequest = serde_json::from_value(params.into())?;
        self.transaction(request).await
    }

    /// `GET balance/{account_key}`
    pub async fn balance(&self, account_key: &str) -> Result<BalanceResponse, ApiError> {
        let balance = self.queries.balance(account_key).await?;
        Ok(BalanceResponse {
            account_key: account_key.to_string(),
            balance,
        })
    }

    /// `GET history/{account_key}`
    pub async fn history(
        &self,
        account_key: &str,
        query: HistoryQuery,
    ) -> Result<HistoryResponse, ApiError> {
        let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let page = self
            .queries
            .history(account_key, limit, query.before_token.as_deref())
            .await?;
        Ok(HistoryResponse {
            entries: page.entries.into_iter().map(EntryView::from).collect(),
            next_before_token: page.next_cursor,
        })
    }

    /// `GET audit/{token}`
    pub async fn audit(&self, token: &str) -> Result<AuditResponse, ApiError> {
        match self.queries.entry(token).await? {
            Some(entry) => Ok(AuditResponse {
                entry: entry.into(),
            }),
            None => Err(ApiError::not_found(format!(
                "No transaction recorded for token {}",
                token
            ))),
        }
    }
}
