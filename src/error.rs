/// Unified error types for the Stockroom asset service
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum StockroomError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Request validation errors (400 with a stable reason code)
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Not found errors (unknown id or another tenant's id)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (referenced asset, upload missing from storage)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Forbidden(String),

    /// Rate limit errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Blob storage errors
    #[error("Blob storage error: {0}")]
    BlobStorage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validation failure with a machine-readable reason code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: String },

    #[error("{field} must be greater than zero")]
    InvalidSize { field: String },

    #[error("file type not allowed: {content_type}")]
    FileTypeNotAllowed { field: String, content_type: String },

    #[error("file too large: {size_bytes} bytes exceeds the {max_bytes} byte limit")]
    FileTooLarge {
        field: String,
        size_bytes: i64,
        max_bytes: i64,
    },

    #[error("too many files: at most {max} per request")]
    TooManyFiles { max: usize },

    #[error("unknown purpose: {purpose}")]
    InvalidPurpose { purpose: String },

    #[error("{field}: {message}")]
    Invalid { field: String, message: String },
}

impl ValidationError {
    /// Stable reason code returned to clients
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingField { .. } => "asset.missing_field",
            ValidationError::InvalidSize { .. } => "asset.invalid_size",
            ValidationError::FileTypeNotAllowed { .. } => "asset.file_type_not_allowed",
            ValidationError::FileTooLarge { .. } => "asset.file_too_large",
            ValidationError::TooManyFiles { .. } => "asset.too_many_files",
            ValidationError::InvalidPurpose { .. } => "asset.invalid_purpose",
            ValidationError::Invalid { .. } => "request.invalid",
        }
    }

    /// Field the failure refers to, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::MissingField { field }
            | ValidationError::InvalidSize { field }
            | ValidationError::FileTypeNotAllowed { field, .. }
            | ValidationError::FileTooLarge { field, .. }
            | ValidationError::Invalid { field, .. } => Some(field),
            ValidationError::TooManyFiles { .. } => Some("files"),
            ValidationError::InvalidPurpose { .. } => Some("purpose"),
        }
    }
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "body".to_string());
        ValidationError::Invalid {
            field,
            message: errors.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for StockroomError {
    fn from(errors: validator::ValidationErrors) -> Self {
        StockroomError::Validation(errors.into())
    }
}

/// JSON error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Convert StockroomError to HTTP response
impl IntoResponse for StockroomError {
    fn into_response(self) -> Response {
        let (status, error_code, message, field) = match &self {
            StockroomError::Validation(v) => (
                StatusCode::BAD_REQUEST,
                v.code(),
                v.to_string(),
                v.field().map(String::from),
            ),
            StockroomError::NotFound(_) => {
                (StatusCode::NOT_FOUND, "NotFound", self.to_string(), None)
            }
            StockroomError::Conflict(_) => {
                (StatusCode::CONFLICT, "Conflict", self.to_string(), None)
            }
            StockroomError::Forbidden(_) => {
                (StatusCode::FORBIDDEN, "Forbidden", self.to_string(), None)
            }
            StockroomError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                self.to_string(),
                None,
            ),
            _ => {
                tracing::error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    "Internal server error".to_string(), // Don't leak details
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            field,
        });

        if let StockroomError::RateLimitExceeded { retry_after } = &self {
            // Whole seconds, rounded up
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            return (
                status,
                [(header::RETRY_AFTER, secs.max(1).to_string())],
                body,
            )
                .into_response();
        }

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type StockroomResult<T> = Result<T, StockroomError>;
