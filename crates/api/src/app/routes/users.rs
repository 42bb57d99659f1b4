use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use agrolens_core::Credits;

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_user))
        .route("/deposit", post(deposit))
        .route("/balance", get(balance))
        .route("/transactions", get(transactions))
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateUserRequest>,
) -> axum::response::Response {
    if body.username.trim().is_empty() || body.email.trim().is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation",
            "username and email are required",
        );
    }

    match services.store.create_user(&body.username, &body.email).await {
        Ok(account) => {
            (StatusCode::CREATED, Json(dto::account_to_json(account))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn deposit(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<dto::DepositRequest>,
) -> axum::response::Response {
    let user_id = match common::current_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .store
        .deposit(user_id, Credits::from_hundredths(body.amount))
        .await
    {
        Ok(account) => (StatusCode::OK, Json(dto::account_to_json(account))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn balance(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
) -> axum::response::Response {
    let user_id = match common::current_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.store.user(user_id).await {
        Ok(account) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "user_id": account.user_id,
                "balance": account.balance,
            })),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn transactions(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
) -> axum::response::Response {
    let user_id = match common::current_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.store.transactions_for(user_id).await {
        Ok(items) => {
            let items = items
                .into_iter()
                .map(dto::transaction_to_json)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}
