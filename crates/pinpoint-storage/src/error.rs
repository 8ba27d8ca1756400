//! Storage error types.

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    /// Worth retrying: timeouts, dispatch failures, 5xx and throttling.
    #[error("Transient storage error: {0}")]
    Transient(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }

    /// Classify an S3 SDK failure, falling back to `otherwise` for
    /// non-transient errors.
    pub fn from_sdk<E>(err: SdkError<E, HttpResponse>, otherwise: fn(String) -> StorageError) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let message = DisplayErrorContext(&err).to_string();

        let transient = match &err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
                true
            }
            SdkError::ServiceError(ctx) => {
                is_transient_status(ctx.raw().status().as_u16())
                    || is_transient_code(ctx.err().code())
            }
            _ => false,
        };

        if transient {
            StorageError::Transient(message)
        } else {
            otherwise(message)
        }
    }
}

/// Server-side failures and throttling.
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn is_transient_code(code: Option<&str>) -> bool {
    matches!(
        code,
        Some("SlowDown" | "RequestTimeout" | "InternalError" | "ServiceUnavailable")
    )
}
