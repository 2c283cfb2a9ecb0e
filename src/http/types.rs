//! HTTP types for the Calculate service
//!
//! - [`HttpError`]: maps engine errors onto status codes and a JSON body
//! - [`HealthResponse`]: body of `GET /health`

use crate::error::{ErrorCategory, TensorServeError};
use axum::{
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Suggested retry delay for unavailable-class errors (in seconds)
pub const RETRY_AFTER_SECONDS: u32 = 60;

/// HTTP error response with a status code derived from the error category
#[derive(Debug)]
pub struct HttpError {
    pub error: TensorServeError,
    /// Retry-After value for recoverable errors
    pub retry_after: Option<u32>,
}

impl HttpError {
    pub fn new(error: TensorServeError) -> Self {
        let retry_after = error.is_recoverable().then_some(RETRY_AFTER_SECONDS);
        Self { error, retry_after }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.error.category() {
            ErrorCategory::AlreadyExists => StatusCode::CONFLICT,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorCategory::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            ErrorCategory::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TensorServeError> for HttpError {
    fn from(error: TensorServeError) -> Self {
        Self::new(error)
    }
}

/// JSON body of an error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub category: String,
    pub status: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        use axum::http::header::RETRY_AFTER;

        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self.error, "calculate failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.error, "calculate rejected");
        }

        let body = Json(ErrorBody {
            error: self.error.to_string(),
            category: self.error.category().to_string(),
            status: "error".to_string(),
        });

        let mut headers = HeaderMap::new();
        if let Some(retry_after) = self.retry_after {
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
        }

        (status, headers, body).into_response()
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
    pub compute_threads: usize,
    pub evaluation_mode: String,
}
