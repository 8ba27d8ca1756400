//! Analysis pipeline: prepare media, run the upload session, publish.
//!
//! At most one session runs per asset path. A second `analyze` for an asset
//! whose session is still active fails fast with `SessionActive`; sessions
//! for different assets are independent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use pinpoint_inference::{
    AnalysisOutcome, InferenceError, ProgressEstimator, ResilientUploader, SessionTracker,
};
use pinpoint_media::{MediaPreparer, PreparedMedia};
use pinpoint_models::{AnalysisRequest, Post, PostDraft, SessionEvent, UploadSession};

use crate::error::{PipelineError, PipelineResult};
use crate::logging::SessionLogger;
use crate::persister::PostPersister;

type ActiveSessions = Mutex<HashMap<PathBuf, Arc<SessionTracker>>>;

/// Removes an asset's session from the active set when dropped.
struct SessionGuard<'a> {
    sessions: &'a ActiveSessions,
    asset: PathBuf,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        lock(self.sessions).remove(&self.asset);
    }
}

fn lock(sessions: &ActiveSessions) -> MutexGuard<'_, HashMap<PathBuf, Arc<SessionTracker>>> {
    sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct AnalysisPipeline {
    preparer: Arc<dyn MediaPreparer>,
    uploader: ResilientUploader,
    persister: Option<PostPersister>,
    estimator: ProgressEstimator,
    events: broadcast::Sender<SessionEvent>,
    active: ActiveSessions,
}

impl AnalysisPipeline {
    pub fn new(
        preparer: Arc<dyn MediaPreparer>,
        uploader: ResilientUploader,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            preparer,
            uploader,
            persister: None,
            estimator: ProgressEstimator::default(),
            events,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_persister(mut self, persister: PostPersister) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn with_estimator(mut self, estimator: ProgressEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Session events for every analysis this pipeline runs.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn persister(&self) -> Option<&PostPersister> {
        self.persister.as_ref()
    }

    /// Validate a local video and extract its thumbnail.
    pub async fn prepare(&self, path: &Path, declared_mime: Option<&str>) -> PipelineResult<PreparedMedia> {
        Ok(self.preparer.prepare(path, declared_mime).await?)
    }

    /// State of the active session for `asset`, if one is running.
    pub fn session_snapshot(&self, asset: &Path) -> Option<UploadSession> {
        lock(&self.active).get(asset).map(|tracker| tracker.snapshot())
    }

    /// Run one upload session for `request`.
    ///
    /// The request is only borrowed; a failed session can be retried by
    /// calling this again with the same value.
    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
    ) -> PipelineResult<AnalysisOutcome> {
        let tracker = Arc::new(SessionTracker::new(
            request.id().clone(),
            self.estimator.clone(),
            self.events.clone(),
        ));
        let _guard = self.begin_session(request.asset().path(), tracker.clone())?;

        let logger = SessionLogger::for_request(request.id(), "analyze");
        logger.log_start(&request.asset().file_name());

        let result = self
            .uploader
            .upload(request, tracker, cancel)
            .instrument(logger.create_span())
            .await;

        match &result {
            Ok(outcome) => logger.log_completion(&format!(
                "{} actions after {} attempt(s)",
                outcome.result.total(),
                outcome.attempts
            )),
            Err(InferenceError::Cancelled) => logger.log_warning("analysis cancelled"),
            Err(e) => logger.log_error(&e.to_string()),
        }

        Ok(result?)
    }

    /// Persist an analysed video as a post.
    pub async fn publish(&self, draft: PostDraft) -> PipelineResult<Post> {
        let persister = self
            .persister
            .as_ref()
            .ok_or_else(|| PipelineError::config_error("publishing is not configured"))?;
        persister.persist(draft).await
    }

    fn begin_session(&self, asset: &Path, tracker: Arc<SessionTracker>) -> PipelineResult<SessionGuard<'_>> {
        let mut active = lock(&self.active);
        if active.contains_key(asset) {
            return Err(PipelineError::SessionActive(asset.to_path_buf()));
        }
        active.insert(asset.to_path_buf(), tracker);

        Ok(SessionGuard {
            sessions: &self.active,
            asset: asset.to_path_buf(),
        })
    }
}
