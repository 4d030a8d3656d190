use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{InvalidJobKind, InvalidRange, InvalidSymbol, JobFailure, JobKey, Symbol};
use crate::services::job_registry::RegistryError;

#[derive(Debug, Error)]
pub enum AppError {
    /// A job run ended in `Timeout`, `ProcessFailure` or `DecodeFailure`.
    #[error("{0}")]
    Job(JobFailure),
    #[error("market data provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{key} is still running")]
    Pending { key: JobKey, run_id: Option<Uuid> },
    #[error("no trained model for {symbol}")]
    NotTrained {
        symbol: Symbol,
        last_error: Option<JobFailure>,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable snake_case tag clients can branch on.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Job(JobFailure::Timeout { .. }) => "timeout",
            AppError::Job(JobFailure::ProcessFailure { .. }) => "process_failure",
            AppError::Job(JobFailure::DecodeFailure { .. }) => "decode_failure",
            AppError::ProviderUnavailable(_) => "provider_unavailable",
            AppError::Conflict(_) => "conflict",
            AppError::Pending { .. } => "pending",
            AppError::NotTrained { .. } => "not_trained",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Job(_) => StatusCode::BAD_GATEWAY,
            AppError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Conflict(_) | AppError::Pending { .. } => StatusCode::CONFLICT,
            AppError::NotTrained { .. } | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn retry_after(&self) -> Option<&'static str> {
        match self {
            AppError::Job(JobFailure::Timeout { .. }) => Some("60"),
            AppError::ProviderUnavailable(_) => Some("30"),
            AppError::Pending { .. } => Some("5"),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });

        match &self {
            AppError::Job(failure) => body["detail"] = json!(failure),
            AppError::Pending { run_id, .. } => {
                body["status"] = json!("running");
                body["run_id"] = json!(run_id);
            }
            AppError::NotTrained {
                last_error: Some(failure),
                ..
            } => body["last_error"] = json!(failure),
            _ => {}
        }

        let mut headers = HeaderMap::new();
        if let Some(secs) = self.retry_after() {
            headers.insert("Retry-After", HeaderValue::from_static(secs));
        }

        (status, headers, Json(body)).into_response()
    }
}

impl From<JobFailure> for AppError {
    fn from(value: JobFailure) -> Self {
        AppError::Job(value)
    }
}

impl From<RegistryError> for AppError {
    fn from(value: RegistryError) -> Self {
        AppError::Conflict(value.to_string())
    }
}

impl From<InvalidSymbol> for AppError {
    fn from(value: InvalidSymbol) -> Self {
        AppError::Validation(value.to_string())
    }
}

impl From<InvalidRange> for AppError {
    fn from(value: InvalidRange) -> Self {
        AppError::Validation(value.to_string())
    }
}

impl From<InvalidJobKind> for AppError {
    fn from(value: InvalidJobKind) -> Self {
        AppError::Validation(value.to_string())
    }
}
