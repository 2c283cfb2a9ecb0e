//! HTTP route definitions for the Calculate service

use super::handlers::{calculate_handler, health_handler};
use super::server::CalcServer;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

/// Create the router:
/// - `POST /v1/calculate`: evaluate a tensor batch
/// - `GET /health`: backend and pool information
pub fn create_router(server: CalcServer) -> Router {
    Router::new()
        .route("/v1/calculate", post(calculate_handler))
        .route("/health", get(health_handler))
        .layer(ServiceBuilder::new().layer(CorsLayer::new().allow_origin(Any).allow_headers(Any)))
        .with_state(server)
}
