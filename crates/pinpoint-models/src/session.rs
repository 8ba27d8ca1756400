//! Upload session state and the events published while it runs.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::request::RequestId;

/// Phase of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Multipart body is being written to the spool
    Encoding,
    /// Local bytes are being streamed to the service
    Sending,
    /// Request fully sent, waiting for the service to finish inference
    AwaitingResponse,
    /// Backing off before the next attempt
    Retrying,
    Succeeded,
    Failed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Encoding => "encoding",
            SessionPhase::Sending => "sending",
            SessionPhase::AwaitingResponse => "awaiting_response",
            SessionPhase::Retrying => "retrying",
            SessionPhase::Succeeded => "succeeded",
            SessionPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Succeeded | SessionPhase::Failed)
    }
}

/// A discrete state transition or progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SessionEvent {
    pub request_id: RequestId,
    pub phase: SessionPhase,
    /// Overall progress in [0, 1]
    pub progress: f64,
    /// 1-based transport attempt
    pub attempt: u32,
    /// Human-readable status line
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of an upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UploadSession {
    pub request_id: RequestId,
    pub phase: SessionPhase,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub progress: f64,
}

impl UploadSession {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            phase: SessionPhase::Idle,
            attempts: 0,
            started_at: Utc::now(),
            elapsed_ms: 0,
            last_error: None,
            progress: 0.0,
        }
    }

    /// Fold an event into the snapshot. Progress never moves backwards.
    pub fn apply(&mut self, event: &SessionEvent) {
        self.phase = event.phase;
        self.attempts = self.attempts.max(event.attempt);
        self.progress = self.progress.max(event.progress);
        if event.error.is_some() {
            self.last_error = event.error.clone();
        }
        self.elapsed_ms = (event.timestamp - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
    }
}
