use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use deedbank_core::DomainError;
use deedbank_infra::LedgerError;

/// Handler result: both arms are complete HTTP responses.
pub type ApiResult = Result<Response, Response>;

pub fn ledger_error_to_response(err: LedgerError) -> Response {
    match err {
        LedgerError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        LedgerError::InvalidPoints(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_points", msg),
        LedgerError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        LedgerError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        LedgerError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        e @ LedgerError::InsufficientBalance { .. } => {
            json_error(StatusCode::CONFLICT, "insufficient_balance", e.to_string())
        }
        LedgerError::Timeout(msg) => {
            tracing::warn!(error = %msg, "store timeout");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "timeout", msg)
        }
        e @ (LedgerError::Store(_) | LedgerError::Export(_)) => {
            tracing::error!(error = %e, "request failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path or body identifier, answering 400 on garbage.
pub fn parse_id<T>(raw: &str) -> Result<T, Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.trim()
        .parse()
        .map_err(|e: DomainError| json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
