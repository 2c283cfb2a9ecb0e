//! HTTP request handlers for the Calculate service

use super::server::CalcServer;
use super::types::{HealthResponse, HttpError};
use crate::api::{CalculateRequest, CalculateResponse};
use crate::error::TensorServeError;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use tracing::info;

/// `POST /v1/calculate`
///
/// Bodies that fail to parse (unknown operation, missing payload, wrong
/// types) are `InvalidRequest` like any other malformed batch.
pub async fn calculate_handler(
    State(server): State<CalcServer>,
    body: Result<Json<CalculateRequest>, JsonRejection>,
) -> Result<Json<CalculateResponse>, HttpError> {
    let Json(request) =
        body.map_err(|rejection| TensorServeError::InvalidRequest(rejection.body_text()))?;
    info!(
        tensors = request.tensors.len(),
        outputs = ?request.output_tensor_ids,
        "Received calculate request"
    );

    let response = server.calculate(request).await?;
    Ok(Json(response))
}

/// `GET /health`
pub async fn health_handler(State(server): State<CalcServer>) -> Json<HealthResponse> {
    let config = server.engine.config();
    Json(HealthResponse {
        status: "healthy".to_string(),
        backend: config.backend.to_string(),
        compute_threads: server.engine.compute_threads(),
        evaluation_mode: config.evaluation_mode.to_string(),
    })
}
