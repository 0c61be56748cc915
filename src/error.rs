//! Application error types

use crate::formula::FormulaError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    #[error("Incomplete measurement: {0}")]
    IncompleteMeasurement(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Pricing error: {0}")]
    Pricing(String),

    #[error("Stale response: {0}")]
    Stale(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Http(_) => "HTTP_ERROR",
            AppError::Formula(_) => "FORMULA_ERROR",
            AppError::IncompleteMeasurement(_) => "INCOMPLETE_MEASUREMENT",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::Pricing(_) => "PRICING_ERROR",
            AppError::Stale(_) => "STALE_RESPONSE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Formula(_) => StatusCode::BAD_REQUEST,
            AppError::IncompleteMeasurement(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidTransition(_) | AppError::Stale(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Http(_) | AppError::Pricing(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Serializable error body for API clients
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        ErrorResponse {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = ErrorResponse::from(&self);
        let envelope = serde_json::json!({
            "status": "error",
            "code": body.code,
            "message": body.message,
        });

        (status, Json(envelope)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
