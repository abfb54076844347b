//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: auth core and directories shared by every request
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post},
};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let public = Router::new()
        .route("/health", get(routes::system::health))
        .route("/auth/login", post(routes::auth::login))
        .layer(Extension(services.clone()));

    Router::new()
        .merge(public)
        .merge(routes::router(services))
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(
            middleware::resolve_client_address,
        )))
}
