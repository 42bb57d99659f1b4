use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use agrolens_infra::StoreError;
use agrolens_ledger::LedgerError;
use agrolens_pipeline::SubmitError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound(entity) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{entity} not found"))
        }
        StoreError::Ledger(LedgerError::InvalidAmount) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_amount", "amount must be positive")
        }
        StoreError::Ledger(e @ LedgerError::InsufficientFunds { .. }) => {
            json_error(StatusCode::FORBIDDEN, "insufficient_balance", e.to_string())
        }
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn submit_error_to_response(err: SubmitError) -> axum::response::Response {
    match err {
        SubmitError::UserNotFound => json_error(StatusCode::NOT_FOUND, "not_found", "user not found"),
        SubmitError::ModelNotFound => {
            json_error(StatusCode::NOT_FOUND, "not_found", "model not found")
        }
        SubmitError::ImageNotFound => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "no image available for this user",
        ),
        SubmitError::InsufficientBalance {
            available,
            required,
            deficit,
        } => (
            StatusCode::FORBIDDEN,
            axum::Json(json!({
                "error": "insufficient_balance",
                "message": format!("insufficient balance: available {available}, required {required}"),
                "available": available,
                "required": required,
                "deficit": deficit,
            })),
        )
            .into_response(),
        SubmitError::Store(e) => store_error_to_response(e),
        SubmitError::Queue(e) => json_error(StatusCode::BAD_GATEWAY, "publish_error", e.to_string()),
    }
}
