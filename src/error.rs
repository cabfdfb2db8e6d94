#[cfg(feature = "web")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Main error type for the application
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// I/O errors (staging uploads, reading weights, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The uploaded bytes are not a decodable image
    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    /// No embedding backend could be brought up; the pixel strategy takes over.
    /// Only produced by the startup probe.
    #[error("Embedding extraction unavailable: {0}")]
    ExtractionUnavailable(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upload errors
    #[error("Upload error: {0}")]
    UploadError(String),

    /// Request body exceeded the configured upload limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Internal server errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error body returned by the HTTP API
#[derive(Serialize)]
#[derive(Debug)]
pub struct ErrorResponse {
    /// Human readable failure detail
    pub detail: String,
}

impl AppError {
    #[cfg(feature = "web")]
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::UploadError(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error is a processing failure rather than a caller mistake
    pub fn is_processing_failure(&self) -> bool {
        !matches!(
            self,
            Self::InvalidInput(_) | Self::UploadError(_) | Self::PayloadTooLarge(_)
        )
    }

    /// Convert the error to a JSON response body
    pub fn to_json(&self) -> ErrorResponse {
        let detail = if self.is_processing_failure() {
            format!("Internal Server Error during processing: {}", self)
        } else {
            self.to_string()
        };

        ErrorResponse { detail }
    }
}

#[cfg(feature = "web")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        } else {
            log::debug!("Rejected request: {}", self);
        }

        (status, Json(self.to_json())).into_response()
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Task join error: {}", err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}

#[cfg(feature = "web")]
impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(err.body_text())
        } else {
            AppError::UploadError(err.body_text())
        }
    }
}

#[cfg(feature = "web")]
impl From<axum::extract::multipart::MultipartRejection> for AppError {
    fn from(err: axum::extract::multipart::MultipartRejection) -> Self {
        AppError::UploadError(err.body_text())
    }
}

#[cfg(feature = "web")]
impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(err: axum::extract::rejection::QueryRejection) -> Self {
        AppError::InvalidInput(err.body_text())
    }
}

#[cfg(feature = "embeddings")]
impl From<tch::TchError> for AppError {
    fn from(err: tch::TchError) -> Self {
        AppError::Internal(format!("PyTorch error: {}", err))
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Extension trait for working with Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    /// Add context to an error if the result is an error
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| AppError::Internal(format!("{}: {}", context, e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| {
            let context = f();
            AppError::Internal(format!("{}: {}", context, e))
        })
    }
}
