//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use pinpoint_models::RetryPolicy;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Identity of the signed-in author, if any
    pub author_id: Option<String>,
    /// Work directory for thumbnails and upload spools
    pub work_dir: PathBuf,
    /// Retry policy for transient object storage failures
    pub storage_retry: RetryPolicy,
    /// Buffered session and post events per subscriber
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            author_id: None,
            work_dir: std::env::temp_dir().join("pinpoint"),
            storage_retry: RetryPolicy::linear(3, Duration::from_secs(1)),
            event_capacity: 256,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            author_id: std::env::var("PINPOINT_AUTHOR_ID")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            work_dir: std::env::var("PINPOINT_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            storage_retry: RetryPolicy::linear(
                std::env::var("PINPOINT_STORAGE_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.storage_retry.max_attempts),
                defaults.storage_retry.base_delay,
            ),
            event_capacity: defaults.event_capacity,
        }
    }

    /// Scratch space for thumbnails.
    pub fn thumbnail_dir(&self) -> PathBuf {
        self.work_dir.join("thumbnails")
    }

    /// Scratch space for multipart spools.
    pub fn spool_dir(&self) -> PathBuf {
        self.work_dir.join("spool")
    }
}
