use axum::Router;

pub mod common;
pub mod service;
pub mod system;
pub mod users;

/// Router for all service endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/users", users::router())
        .nest("/service", service::router())
}
