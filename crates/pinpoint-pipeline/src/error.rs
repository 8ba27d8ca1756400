//! Pipeline error types.

use std::path::PathBuf;

use thiserror::Error;

use pinpoint_firestore::FirestoreError;
use pinpoint_inference::InferenceError;
use pinpoint_media::MediaError;
use pinpoint_storage::StorageError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Analysis error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{step} gave up after {attempts} attempts: {last}")]
    StorageRetriesExhausted {
        step: &'static str,
        attempts: u32,
        #[source]
        last: StorageError,
    },

    #[error("Firestore error: {0}")]
    Firestore(#[from] FirestoreError),

    #[error("No authenticated author")]
    AuthenticationMissing,

    #[error("An analysis is already running for {}", .0.display())]
    SessionActive(PathBuf),

    #[error("Invalid post draft: {0}")]
    InvalidDraft(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl PipelineError {
    pub fn invalid_draft(msg: impl Into<String>) -> Self {
        Self::InvalidDraft(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether resubmitting the same request may succeed.
    ///
    /// Bounded retries have already run by the time an error reaches the
    /// caller, so this only reports what an explicit user retry could fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Inference(e) => e.root().is_transient(),
            PipelineError::StorageRetriesExhausted { .. } => true,
            PipelineError::Firestore(e) => e.is_retryable(),
            PipelineError::SessionActive(_) => true,
            _ => false,
        }
    }

    /// Short message suitable for showing to a user.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Media(e) if e.is_tooling() => {
                "Video tools are not installed on this machine.".to_string()
            }
            PipelineError::Media(_) => "This video could not be read.".to_string(),
            PipelineError::Inference(e) => e.user_message(),
            PipelineError::Storage(_) | PipelineError::StorageRetriesExhausted { .. } => {
                "Could not upload the video. Please try again.".to_string()
            }
            PipelineError::Firestore(_) => "Could not save the post. Please try again.".to_string(),
            PipelineError::AuthenticationMissing => "Please sign in to post.".to_string(),
            PipelineError::SessionActive(_) => {
                "This video is already being analyzed.".to_string()
            }
            PipelineError::InvalidDraft(reason) => format!("The post is incomplete: {}", reason),
            PipelineError::ConfigError(_) => "The app is not configured correctly.".to_string(),
        }
    }
}
