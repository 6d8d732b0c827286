//! Equipment Photo Pro - Error Types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use photo_pro_auth::AuthError;
use serde_json::json;
use thiserror::Error;

use crate::ai::AiError;

/// Result type for server operations
pub type AppResult<T> = Result<T, AppError>;

/// Server error types
#[derive(Error, Debug)]
pub enum AppError {
    // ═══════════════════════════════════════════════════════════════
    // REQUEST ERRORS
    // ═══════════════════════════════════════════════════════════════
    #[error("{0}")]
    BadRequest(String),

    #[error("No images uploaded")]
    NoImages,

    #[error("File too large: {size} bytes (max: {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Request too large: {0}")]
    RequestTooLarge(String),

    #[error("Only image files are allowed: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    // ═══════════════════════════════════════════════════════════════
    // ACCOUNT ERRORS
    // ═══════════════════════════════════════════════════════════════
    #[error(transparent)]
    Auth(#[from] AuthError),

    // ═══════════════════════════════════════════════════════════════
    // PROCESSING ERRORS
    // ═══════════════════════════════════════════════════════════════
    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("AI service error: {0}")]
    Ai(#[from] AiError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::NoImages | AppError::InvalidFileName(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::SerializationError(_) => StatusCode::BAD_REQUEST,
            AppError::FileTooLarge { .. } | AppError::RequestTooLarge(_) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::FileNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Auth(e) => auth_status(e),
            AppError::ImageError(_)
            | AppError::Ai(_)
            | AppError::IoError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if the caller caused this error
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

fn auth_status(e: &AuthError) -> StatusCode {
    match e {
        AuthError::MissingToken | AuthError::InvalidSession => StatusCode::UNAUTHORIZED,
        AuthError::NotAdmin | AuthError::TrialDenied(_) => StatusCode::FORBIDDEN,
        AuthError::UserNotFound(_) => StatusCode::NOT_FOUND,
        AuthError::EmailDelivery(_) => StatusCode::BAD_GATEWAY,
        AuthError::Database(_) | AuthError::CorruptedRecord(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status.is_server_error() {
            tracing::error!(%status, "request failed: {}", self);
            match &self {
                AppError::Auth(AuthError::EmailDelivery(_)) => {
                    "Failed to send email - please try again later".to_string()
                }
                _ => "Internal server error".to_string(),
            }
        } else {
            tracing::debug!(%status, "request rejected: {}", self);
            self.to_string()
        };

        let body = json!({
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::SerializationError(e.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(e: image::ImageError) -> Self {
        AppError::ImageError(e.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::RequestTooLarge(e.body_text())
        } else {
            AppError::BadRequest(e.body_text())
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("worker task failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::NoImages.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::FileTooLarge { size: 20, max: 10 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AppError::UnsupportedMediaType("text/plain".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(AppError::from(AuthError::InvalidSession).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::from(AuthError::NotAdmin).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::from(AuthError::TrialDenied("limit".into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::from(AuthError::InvalidCode).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::from(AuthError::EmailDelivery("down".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::from(AuthError::Database("locked".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(AppError::InvalidFileName("../x".into()).is_client_error());
        assert!(!AppError::Internal("boom".into()).is_client_error());
    }
}
