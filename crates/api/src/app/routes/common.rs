use axum::http::{HeaderMap, StatusCode};

use agrolens_core::UserId;

use crate::app::errors;

/// Caller identity comes from the `X-User-Id` header. There is no
/// authentication layer in front of this service; the gateway that
/// terminates auth injects the header.
pub fn current_user(headers: &HeaderMap) -> Result<UserId, axum::response::Response> {
    let raw = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            errors::json_error(
                StatusCode::UNAUTHORIZED,
                "missing_user",
                "X-User-Id header is required",
            )
        })?;

    raw.parse().map(UserId::new).map_err(|_| {
        errors::json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_user",
            "X-User-Id must be an integer id",
        )
    })
}
