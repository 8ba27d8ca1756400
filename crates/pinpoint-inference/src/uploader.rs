//! Upload state machine: encode, send, await, retry.
//!
//! ```text
//! Idle -> Encoding -> Sending -> AwaitingResponse -> Succeeded
//!                        ^                        \-> Failed
//!                        |                        \-> Retrying
//!                        +----------------------------/
//! ```
//!
//! Each attempt spools a fresh multipart body. The spool is dropped, and so
//! deleted, before the attempt returns.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use pinpoint_models::{AnalysisRequest, RetryPolicy};

use crate::client::InferenceConfig;
use crate::encoder::MultipartEncoder;
use crate::error::{InferenceError, InferenceResult};
use crate::mapper::ResultMapper;
use crate::progress::{run_ticker, SessionTracker};
use crate::transport::{ByteProgress, InferenceTransport};
use crate::types::{AnalysisOutcome, AnalyzeResponse, TransportResponse};

/// Longest slice of an error body kept for diagnostics.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Drives one [`AnalysisRequest`] to a mapped result or a terminal error.
pub struct ResilientUploader {
    transport: Arc<dyn InferenceTransport>,
    encoder: MultipartEncoder,
    retry: RetryPolicy,
}

impl ResilientUploader {
    pub fn new(
        transport: Arc<dyn InferenceTransport>,
        encoder: MultipartEncoder,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            encoder,
            retry,
        }
    }

    pub fn from_config(
        transport: Arc<dyn InferenceTransport>,
        config: &InferenceConfig,
        spool_dir: impl Into<PathBuf>,
    ) -> Self {
        let encoder = MultipartEncoder::new(spool_dir).with_chunk_size(config.chunk_size);
        Self::new(transport, encoder, config.retry.clone())
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Upload `request` and map the service's counts.
    ///
    /// Transient failures are retried up to the policy's bound; the request
    /// itself is never modified between attempts.
    pub async fn upload(
        &self,
        request: &AnalysisRequest,
        tracker: Arc<SessionTracker>,
        cancel: &CancellationToken,
    ) -> InferenceResult<AnalysisOutcome> {
        let span = info_span!("analysis_upload", request_id = %request.id());

        async move {
            let started = Instant::now();
            let mut attempt: u32 = 1;

            loop {
                counter!("inference_attempts_total").increment(1);

                match self.attempt(request, attempt, &tracker, cancel).await {
                    Ok(response) => {
                        let result = ResultMapper::map(&response.action_counts);
                        tracker.succeed();

                        counter!("inference_outcomes_total", "outcome" => "success").increment(1);
                        histogram!("inference_session_duration_seconds")
                            .record(started.elapsed().as_secs_f64());
                        info!(attempt, total_actions = result.total(), "Analysis succeeded");

                        return Ok(AnalysisOutcome {
                            result,
                            attempts: attempt,
                            crops_url: response.crops_url,
                            total_crops: response.total_crops,
                        });
                    }
                    Err(err) if err.is_transient() && self.retry.allows_retry_after(attempt) => {
                        let delay = self.retry.delay_before_retry(attempt);
                        warn!(
                            "Analysis attempt {} failed, retrying in {:?}: {}",
                            attempt, delay, err
                        );
                        counter!("inference_retries_total").increment(1);
                        tracker.retrying(delay, &err.to_string());

                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                return Err(Self::fail(&tracker, InferenceError::Cancelled));
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                        attempt += 1;
                    }
                    Err(err) if err.is_transient() => {
                        let exhausted = InferenceError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        };
                        return Err(Self::fail(&tracker, exhausted));
                    }
                    Err(err) => return Err(Self::fail(&tracker, err)),
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt(
        &self,
        request: &AnalysisRequest,
        attempt: u32,
        tracker: &Arc<SessionTracker>,
        cancel: &CancellationToken,
    ) -> InferenceResult<AnalyzeResponse> {
        tracker.begin_attempt(attempt);

        let spool = self
            .encoder
            .encode(request, cancel, |copied, total| {
                tracker.encoding_progress(copied, total)
            })
            .await?;

        if cancel.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }
        tracker.sending_started();
        debug!(attempt, body_bytes = spool.len(), "Sending analysis request");

        let body_sent = Arc::new(Notify::new());
        let progress: ByteProgress = {
            let tracker = tracker.clone();
            let body_sent = body_sent.clone();
            Arc::new(move |sent, total| {
                tracker.sending_progress(sent, total);
                if sent >= total {
                    body_sent.notify_one();
                }
            })
        };

        let stop_ticker = cancel.child_token();
        let ticker = tokio::spawn({
            let tracker = tracker.clone();
            let stop = stop_ticker.clone();
            async move {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => return,
                    _ = body_sent.notified() => {}
                }
                tracker.awaiting_response();
                run_ticker(&tracker, &stop).await;
            }
        });

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(InferenceError::Cancelled),
            sent = self.transport.send(&spool, progress) => sent.map_err(InferenceError::from),
        };

        stop_ticker.cancel();
        if let Err(e) = ticker.await {
            warn!("Progress ticker ended abnormally: {}", e);
        }
        drop(spool);

        interpret(sent?)
    }

    fn fail(tracker: &SessionTracker, err: InferenceError) -> InferenceError {
        let outcome = match err.root() {
            InferenceError::Cancelled => "cancelled",
            _ if matches!(err, InferenceError::RetriesExhausted { .. }) => "exhausted",
            _ => "terminal",
        };
        counter!("inference_outcomes_total", "outcome" => outcome).increment(1);
        warn!("Analysis failed ({}): {}", outcome, err);

        tracker.fail(err.user_message(), &err.to_string());
        err
    }
}

/// Classify a completed exchange.
fn interpret(response: TransportResponse) -> InferenceResult<AnalyzeResponse> {
    if response.status != 200 {
        let body: String = String::from_utf8_lossy(&response.body)
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect();
        return Err(InferenceError::BadStatus {
            status: response.status,
            body,
        });
    }

    let parsed: AnalyzeResponse = serde_json::from_slice(&response.body)
        .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

    if !parsed.success {
        return Err(InferenceError::ServiceRejected(
            parsed
                .error
                .unwrap_or_else(|| "service reported success=false".to_string()),
        ));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::MultipartSpool;
    use crate::error::TransportError;
    use crate::progress::ProgressEstimator;
    use async_trait::async_trait;
    use pinpoint_models::{
        ActionCategory, LocalVideoAsset, PinpointSelection, SessionEvent, SessionPhase,
    };
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    type Scripted = Result<TransportResponse, TransportError>;

    /// Replays scripted outcomes, one per call.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Scripted>>,
        calls: AtomicU32,
        latency: Duration,
        bodies: Mutex<Vec<Vec<u8>>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
                latency: Duration::from_millis(30),
                bodies: Mutex::new(Vec::new()),
            }
        }

        fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceTransport for ScriptedTransport {
        async fn send(
            &self,
            spool: &MultipartSpool,
            progress: ByteProgress,
        ) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = tokio::fs::read(spool.path()).await.unwrap();
            self.bodies.lock().unwrap().push(body);

            progress(spool.len() / 2, spool.len());
            progress(spool.len(), spool.len());
            tokio::time::sleep(self.latency).await;

            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into())))
        }
    }

    fn ok(body: &str) -> Scripted {
        Ok(TransportResponse::new(200, body))
    }

    fn timed_out() -> Scripted {
        Err(TransportError::TimedOut("operation timed out".into()))
    }

    struct Harness {
        dir: TempDir,
        request: AnalysisRequest,
        tracker: Arc<SessionTracker>,
        events: broadcast::Receiver<SessionEvent>,
    }

    impl Harness {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let video = dir.path().join("rally.mp4");
            tokio::fs::write(&video, vec![9u8; 3000]).await.unwrap();
            let asset = LocalVideoAsset::with_inferred_mime(&video, 3000).unwrap();
            let selection = PinpointSelection::new(120.0, 340.0, 640, 480).unwrap();
            let request = AnalysisRequest::new(asset, selection);

            let (tx, events) = broadcast::channel(4096);
            let estimator = ProgressEstimator {
                tick_interval: Duration::from_millis(5),
                ..ProgressEstimator::default()
            };
            let tracker = Arc::new(SessionTracker::new(request.id().clone(), estimator, tx));

            Self {
                dir,
                request,
                tracker,
                events,
            }
        }

        fn spool_dir(&self) -> PathBuf {
            self.dir.path().join("spool")
        }

        fn uploader(&self, transport: Arc<ScriptedTransport>) -> ResilientUploader {
            ResilientUploader::new(
                transport,
                MultipartEncoder::new(self.spool_dir()).with_chunk_size(1024),
                RetryPolicy::exponential(3, Duration::from_millis(10)),
            )
        }

        fn drain(&mut self) -> Vec<SessionEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    fn spool_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    fn count_phase(events: &[SessionEvent], phase: SessionPhase) -> usize {
        events.iter().filter(|e| e.phase == phase).count()
    }

    fn assert_monotonic(events: &[SessionEvent]) {
        let mut last = 0.0;
        for event in events {
            assert!(event.progress >= last, "progress went backwards at {:?}", event);
            last = event.progress;
        }
    }

    #[tokio::test]
    async fn test_two_timeouts_then_success() {
        let mut h = Harness::new().await;
        let original = h.request.clone();
        let transport = Arc::new(ScriptedTransport::new(vec![
            timed_out(),
            timed_out(),
            ok(r#"{"success":true,"action_counts":{"serve":3,"dig":41}}"#),
        ]));

        let outcome = h
            .uploader(transport.clone())
            .upload(&h.request, h.tracker.clone(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.count(ActionCategory::Serve), 3);
        assert_eq!(outcome.result.count(ActionCategory::Dig), 41);
        assert_eq!(transport.calls(), 3);
        assert_eq!(h.request, original);

        let events = h.drain();
        assert_eq!(count_phase(&events, SessionPhase::Retrying), 2);
        assert_eq!(events.last().unwrap().phase, SessionPhase::Succeeded);
        assert_eq!(events.last().unwrap().progress, 1.0);
        assert!(events[..events.len() - 1].iter().all(|e| e.progress < 1.0));
        assert_monotonic(&events);

        let snapshot = h.tracker.snapshot();
        assert_eq!(snapshot.attempts, 3);
        assert_eq!(spool_files(&h.spool_dir()), 0);
    }

    #[tokio::test]
    async fn test_retried_bodies_carry_identical_fields() {
        let h = Harness::new().await;
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::ConnectionLost("reset by peer".into())),
            ok(r#"{"success":true,"action_counts":{}}"#),
        ]));

        h.uploader(transport.clone())
            .upload(&h.request, h.tracker.clone(), &CancellationToken::new())
            .await
            .unwrap();

        let bodies = transport.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);
        for body in bodies.iter() {
            let text = String::from_utf8_lossy(body);
            assert!(text.contains("name=\"x\"\r\n\r\n0.1875\r\n"));
            assert!(text.contains("name=\"y\"\r\n\r\n0.7083\r\n"));
            assert!(text.contains("name=\"width\"\r\n\r\n640\r\n"));
            assert!(text.contains("name=\"height\"\r\n\r\n480\r\n"));
        }
        assert_eq!(bodies[0].len(), bodies[1].len());
    }

    #[tokio::test]
    async fn test_success_false_is_terminal() {
        let mut h = Harness::new().await;
        let transport = Arc::new(ScriptedTransport::new(vec![ok(
            r#"{"success":false,"action_counts":{},"error":"no player at pinpoint"}"#,
        )]));

        let err = h
            .uploader(transport.clone())
            .upload(&h.request, h.tracker.clone(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, InferenceError::ServiceRejected(ref r) if r == "no player at pinpoint"));
        assert_eq!(transport.calls(), 1);

        let events = h.drain();
        assert_eq!(count_phase(&events, SessionPhase::Retrying), 0);
        assert_eq!(events.last().unwrap().phase, SessionPhase::Failed);
        assert!(h.tracker.progress() < 1.0);
    }

    #[tokio::test]
    async fn test_bad_status_is_terminal() {
        let h = Harness::new().await;
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(TransportResponse::new(
            503,
            "overloaded",
        ))]));

        let err = h
            .uploader(transport.clone())
            .upload(&h.request, h.tracker.clone(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, InferenceError::BadStatus { status: 503, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_terminal() {
        let h = Harness::new().await;
        let transport = Arc::new(ScriptedTransport::new(vec![ok("<html>gateway</html>")]));

        let err = h
            .uploader(transport.clone())
            .upload(&h.request, h.tracker.clone(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, InferenceError::MalformedResponse(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_other_transport_error_is_terminal() {
        let h = Harness::new().await;
        let transport = Arc::new(ScriptedTransport::new(vec![Err(TransportError::Other(
            "invalid certificate".into(),
        ))]));

        let err = h
            .uploader(transport.clone())
            .upload(&h.request, h.tracker.clone(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, InferenceError::Transport(TransportError::Other(_))));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_attempts_never_exceed_bound() {
        let mut h = Harness::new().await;
        let transport = Arc::new(ScriptedTransport::new(vec![
            timed_out(),
            Err(TransportError::NoRoute("offline".into())),
            timed_out(),
            ok(r#"{"success":true,"action_counts":{}}"#),
        ]));

        let err = h
            .uploader(transport.clone())
            .upload(&h.request, h.tracker.clone(), &CancellationToken::new())
            .await
            .unwrap_err();

        match &err {
            InferenceError::RetriesExhausted { attempts, last } => {
                assert_eq!(*attempts, 3);
                assert!(matches!(**last, InferenceError::Transport(TransportError::TimedOut(_))));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(transport.calls(), 3);

        let events = h.drain();
        assert_eq!(count_phase(&events, SessionPhase::Retrying), 2);
        assert_monotonic(&events);
        assert!(h.tracker.progress() < 1.0);
        assert_eq!(spool_files(&h.spool_dir()), 0);
    }

    #[tokio::test]
    async fn test_ticker_advances_while_awaiting() {
        let mut h = Harness::new().await;
        let transport = Arc::new(
            ScriptedTransport::new(vec![ok(r#"{"success":true,"action_counts":{}}"#)])
                .with_latency(Duration::from_millis(200)),
        );

        h.uploader(transport)
            .upload(&h.request, h.tracker.clone(), &CancellationToken::new())
            .await
            .unwrap();

        let events = h.drain();
        let awaiting: Vec<_> = events
            .iter()
            .filter(|e| e.phase == SessionPhase::AwaitingResponse)
            .collect();
        assert!(awaiting.len() > 2, "ticker did not run: {:?}", events);
        assert!(awaiting.iter().all(|e| e.progress >= 0.5 && e.progress < 0.99));
        assert!(awaiting.last().unwrap().progress > 0.5);
        assert_monotonic(&events);
    }

    #[tokio::test]
    async fn test_cancel_while_awaiting() {
        let mut h = Harness::new().await;
        let transport = Arc::new(
            ScriptedTransport::new(vec![ok(r#"{"success":true,"action_counts":{}}"#)])
                .with_latency(Duration::from_secs(30)),
        );
        let cancel = CancellationToken::new();

        let uploader = h.uploader(transport);
        let trigger = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            }
        };
        let (result, _) = tokio::join!(
            uploader.upload(&h.request, h.tracker.clone(), &cancel),
            trigger
        );

        assert!(matches!(result.unwrap_err(), InferenceError::Cancelled));
        assert_eq!(h.drain().last().unwrap().phase, SessionPhase::Failed);

        let frozen = h.tracker.progress();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.tracker.progress(), frozen);
        assert!(frozen < 1.0);
        assert_eq!(spool_files(&h.spool_dir()), 0);
    }

    #[test]
    fn test_interpret_truncates_error_body() {
        let long = "x".repeat(2000);
        let err = interpret(TransportResponse::new(500, long)).unwrap_err();
        match err {
            InferenceError::BadStatus { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), MAX_ERROR_BODY_CHARS);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
