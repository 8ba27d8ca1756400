//! Structured session logging utilities.
//!
//! Provides consistent, structured logging for analysis and publishing
//! sessions with tracing spans and contextual information.

use tracing::{error, info, warn, Span};

use pinpoint_models::{PostId, RequestId};

/// Session logger for structured logging with consistent formatting.
///
/// Every message carries the session ID and the operation being performed.
#[derive(Debug, Clone)]
pub struct SessionLogger {
    session_id: String,
    operation: String,
}

impl SessionLogger {
    /// Logger for an analysis session.
    pub fn for_request(request_id: &RequestId, operation: &str) -> Self {
        Self::from_string(request_id.as_str(), operation)
    }

    /// Logger for publishing a post.
    pub fn for_post(post_id: &PostId, operation: &str) -> Self {
        Self::from_string(post_id.as_str(), operation)
    }

    pub fn from_string(session_id: &str, operation: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            operation = %self.operation,
            "Session started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            operation = %self.operation,
            "Session progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            session_id = %self.session_id,
            operation = %self.operation,
            "Session warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            session_id = %self.session_id,
            operation = %self.operation,
            "Session error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            operation = %self.operation,
            "Session completed: {}", message
        );
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this session.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "session",
            session_id = %self.session_id,
            operation = %self.operation
        )
    }
}
