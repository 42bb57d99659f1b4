use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use agrolens_core::{Credits, ImageId, ModelId, TaskId};
use agrolens_tasks::ModelSpec;

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/models", get(list_models).post(register_model))
        .route("/upload", post(upload_image))
        .route("/prediction", post(submit_prediction))
        .route("/predictions", get(list_predictions))
        .route("/tasks/:id", get(get_task))
}

pub async fn list_models(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.store.models().await {
        Ok(models) => {
            let items = models.into_iter().map(dto::model_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn register_model(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterModelRequest>,
) -> axum::response::Response {
    if body.name.trim().is_empty() || body.artifact_path.trim().is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation",
            "name and artifact_path are required",
        );
    }
    if body.cost < 0 {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation",
            "cost must not be negative",
        );
    }

    let spec = ModelSpec {
        name: body.name,
        description: body.description,
        cost: Credits::from_hundredths(body.cost),
        artifact_path: body.artifact_path,
    };
    match services.store.register_model(spec).await {
        Ok(model) => (StatusCode::CREATED, Json(dto::model_to_json(model))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub filename: Option<String>,
}

pub async fn upload_image(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> axum::response::Response {
    let user_id = match common::current_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if body.is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation", "empty upload body");
    }

    let filename = params.filename.unwrap_or_else(|| "upload.jpg".to_string());
    let object_name = format!("{}-{filename}", uuid::Uuid::now_v7());

    let urls = match services.blobs.put(&object_name, body.to_vec()).await {
        Ok(urls) => urls,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_GATEWAY, "blob_error", e.to_string())
        }
    };

    match services
        .store
        .record_image(user_id, &urls.public_url, &urls.internal_url, &object_name)
        .await
    {
        Ok(image) => (StatusCode::CREATED, Json(dto::image_to_json(image))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn submit_prediction(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<dto::PredictRequest>,
) -> axum::response::Response {
    let user_id = match common::current_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let receipt = services
        .producer
        .submit(
            user_id,
            ModelId::new(body.model_id),
            body.image_id.map(ImageId::new),
            body.latitude,
            body.longitude,
        )
        .await;

    match receipt {
        // 202: the task is queued; the outcome lands asynchronously.
        Ok(receipt) => (StatusCode::ACCEPTED, Json(dto::receipt_to_json(receipt))).into_response(),
        Err(e) => errors::submit_error_to_response(e),
    }
}

pub async fn list_predictions(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
) -> axum::response::Response {
    let user_id = match common::current_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.store.predictions_for(user_id).await {
        Ok(items) => {
            let items = items
                .into_iter()
                .map(dto::prediction_to_json)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_task(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> axum::response::Response {
    let user_id = match common::current_user(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.store.task(TaskId::new(id)).await {
        // Tasks are private; someone else's task looks like a missing one.
        Ok(task) if task.user_id == user_id => {
            (StatusCode::OK, Json(dto::task_to_json(task))).into_response()
        }
        Ok(_) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "task not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}
