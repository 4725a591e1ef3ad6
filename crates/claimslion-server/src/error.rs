//! Error types of the HTTP layer and their mapping onto status codes.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use claimslion::{
    ChatError, ClaimsError, ConfigError, DatabaseError, IntakeError, LlmError, StorageError,
    WaitError,
};

/// Fatal errors while starting or running the server.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Model client error: {0}")]
    Llm(#[from] LlmError),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A request failure rendered as `{"error": ..., "code": ...}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    WaitTimeout { message: String, last_status: String },

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::WaitTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::PayloadTooLarge(_) => "file_too_large",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::WaitTimeout { .. } => "wait_timeout",
            ApiError::BadGateway(_) => "upstream_error",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::Internal(_) => "internal",
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        tracing::error!(error = %error, "Request failed");
        ApiError::Internal("Internal server error".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        if let ApiError::WaitTimeout { last_status, .. } = &self {
            body["lastStatus"] = json!(last_status);
        }
        (self.status(), Json(body)).into_response()
    }
}

impl From<ClaimsError> for ApiError {
    fn from(error: ClaimsError) -> Self {
        match error {
            ClaimsError::Intake(e @ IntakeError::TooLarge { .. }) => {
                ApiError::PayloadTooLarge(e.to_string())
            }
            ClaimsError::Intake(e) => ApiError::BadRequest(e.to_string()),
            ClaimsError::Spreadsheet(e) => ApiError::BadRequest(e.to_string()),
            ClaimsError::JobNotFound(id) => ApiError::NotFound(format!("Job not found: {}", id)),
            e @ ClaimsError::JobNotTerminal { .. } => ApiError::Conflict(e.to_string()),
            ClaimsError::Storage(StorageError::NotFound(_)) => {
                ApiError::NotFound("Original file not found".to_string())
            }
            ClaimsError::Llm(e) => ApiError::BadGateway(e.to_string()),
            other => ApiError::internal(other),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        match error {
            e @ ChatError::EmptyMessage => ApiError::BadRequest(e.to_string()),
            e @ ChatError::NotFound(_) => ApiError::NotFound(e.to_string()),
            e @ ChatError::NotReady { .. } => ApiError::Conflict(e.to_string()),
            ChatError::Model(e) => {
                tracing::warn!(error = %e, "Chat model request failed");
                ApiError::BadGateway(format!("Failed to get a response from the model: {}", e))
            }
            ChatError::Database(e) => ApiError::internal(e),
        }
    }
}

impl From<WaitError> for ApiError {
    fn from(error: WaitError) -> Self {
        match &error {
            WaitError::NotFound(_) => ApiError::NotFound(error.to_string()),
            WaitError::Timeout { last_status, .. } => ApiError::WaitTimeout {
                message: error.to_string(),
                last_status: last_status.as_str().to_string(),
            },
            WaitError::Cancelled => ApiError::Unavailable("Server is shutting down".to_string()),
            WaitError::Database(e) => ApiError::internal(e),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge("File exceeds the upload size limit".to_string())
        } else {
            ApiError::BadRequest(format!("Invalid multipart upload: {}", error.body_text()))
        }
    }
}
