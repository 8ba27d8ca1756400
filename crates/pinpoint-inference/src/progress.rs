//! Upload progress estimation and session event publishing.
//!
//! Progress is split into three bands:
//!
//! - encoding the spool advances over `[0, encoding_end]` by bytes copied
//! - streaming the body advances over `[encoding_end, sending_end]` by bytes sent
//! - while the service works, a ticker creeps toward `ceiling` without reaching it
//!
//! Only a successful session reaches 1.0. Progress never moves backwards,
//! including across retries.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use pinpoint_models::{RequestId, SessionEvent, SessionPhase, UploadSession};

/// Heuristic progress bands and ticker cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEstimator {
    /// Upper bound of the encoding band
    pub encoding_end: f64,
    /// Upper bound of the sending band
    pub sending_end: f64,
    /// Nominal ticker increment
    pub tick_step: f64,
    pub tick_interval: Duration,
    /// Value the ticker approaches but never reaches
    pub ceiling: f64,
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self {
            encoding_end: 0.2,
            sending_end: 0.5,
            tick_step: 0.01,
            tick_interval: Duration::from_millis(500),
            ceiling: 0.99,
        }
    }
}

impl ProgressEstimator {
    pub fn encoding(&self, copied: u64, total: u64) -> f64 {
        self.encoding_end * fraction(copied, total)
    }

    pub fn sending(&self, sent: u64, total: u64) -> f64 {
        self.encoding_end + (self.sending_end - self.encoding_end) * fraction(sent, total)
    }

    /// Next ticker value. The step halves as the ceiling gets close and
    /// the ceiling itself is never returned.
    pub fn next_tick(&self, current: f64) -> f64 {
        if current >= self.ceiling {
            return current;
        }
        let step = self.tick_step.min((self.ceiling - current) / 2.0);
        let next = current + step;
        if next >= self.ceiling {
            current
        } else {
            next
        }
    }
}

fn fraction(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (done as f64 / total as f64).clamp(0.0, 1.0)
}

struct TrackerState {
    session: UploadSession,
    attempt: u32,
}

/// Owns the progress of one upload session and publishes its events.
pub struct SessionTracker {
    estimator: ProgressEstimator,
    events: broadcast::Sender<SessionEvent>,
    state: Mutex<TrackerState>,
}

impl SessionTracker {
    pub fn new(
        request_id: RequestId,
        estimator: ProgressEstimator,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            estimator,
            events,
            state: Mutex::new(TrackerState {
                session: UploadSession::new(request_id),
                attempt: 0,
            }),
        }
    }

    pub fn estimator(&self) -> &ProgressEstimator {
        &self.estimator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current session state.
    pub fn snapshot(&self) -> UploadSession {
        self.lock().session.clone()
    }

    pub fn progress(&self) -> f64 {
        self.lock().session.progress
    }

    pub fn begin_attempt(&self, attempt: u32) {
        self.lock().attempt = attempt;
        self.emit(SessionPhase::Encoding, 0.0, "Preparing upload...".to_string(), None, true);
    }

    pub fn encoding_progress(&self, copied: u64, total: u64) {
        let target = self.estimator.encoding(copied, total);
        self.emit(SessionPhase::Encoding, target, "Preparing upload...".to_string(), None, false);
    }

    pub fn sending_started(&self) {
        let target = self.estimator.encoding_end;
        self.emit(SessionPhase::Sending, target, "Uploading video...".to_string(), None, true);
    }

    pub fn sending_progress(&self, sent: u64, total: u64) {
        let target = self.estimator.sending(sent, total);
        let status = format!("Uploading video... {:.0}%", fraction(sent, total) * 100.0);
        self.emit(SessionPhase::Sending, target, status, None, false);
    }

    pub fn awaiting_response(&self) {
        let target = self.estimator.sending_end;
        self.emit(SessionPhase::AwaitingResponse, target, "Analyzing video...".to_string(), None, true);
    }

    pub fn tick(&self) {
        let next = self.estimator.next_tick(self.progress());
        self.emit(SessionPhase::AwaitingResponse, next, "Analyzing video...".to_string(), None, false);
    }

    pub fn retrying(&self, delay: Duration, cause: &str) {
        let secs = delay.as_millis().div_ceil(1000);
        let status = format!("Connection issue. Retrying in {}s...", secs);
        self.emit(SessionPhase::Retrying, 0.0, status, Some(cause.to_string()), true);
    }

    pub fn succeed(&self) {
        self.emit(SessionPhase::Succeeded, 1.0, "Analysis complete".to_string(), None, true);
    }

    pub fn fail(&self, message: String, cause: &str) {
        self.emit(SessionPhase::Failed, 0.0, message, Some(cause.to_string()), true);
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish an event. Progress below the current value is raised to it;
    /// anything short of success stays strictly below the ceiling.
    fn emit(
        &self,
        phase: SessionPhase,
        target: f64,
        status: String,
        error: Option<String>,
        force: bool,
    ) {
        let mut state = self.lock();
        let current = state.session.progress;

        let progress = if phase == SessionPhase::Succeeded {
            1.0
        } else {
            let capped = if target >= self.estimator.ceiling {
                current
            } else {
                target
            };
            current.max(capped)
        };

        if !force && phase == state.session.phase && progress <= current {
            return;
        }

        let event = SessionEvent {
            request_id: state.session.request_id.clone(),
            phase,
            progress,
            attempt: state.attempt,
            status,
            error,
            timestamp: Utc::now(),
        };
        state.session.apply(&event);

        trace!(phase = phase.as_str(), progress, "Session event");
        // Sent under the lock so subscribers see events in progress order.
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Advance `tracker` on its estimator's interval until `stop` fires.
pub async fn run_ticker(tracker: &SessionTracker, stop: &CancellationToken) {
    let mut interval = tokio::time::interval(tracker.estimator().tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = interval.tick() => tracker.tick(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (SessionTracker, broadcast::Receiver<SessionEvent>) {
        let (tx, rx) = broadcast::channel(1024);
        let tracker = SessionTracker::new(RequestId::new(), ProgressEstimator::default(), tx);
        (tracker, rx)
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_band_mapping() {
        let est = ProgressEstimator::default();
        assert_eq!(est.encoding(0, 100), 0.0);
        assert!((est.encoding(50, 100) - 0.1).abs() < 1e-12);
        assert!((est.sending(0, 100) - 0.2).abs() < 1e-12);
        assert!((est.sending(100, 100) - 0.5).abs() < 1e-12);
        assert!((est.sending(10, 0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_ticker_never_reaches_ceiling() {
        let est = ProgressEstimator::default();
        assert!((est.next_tick(0.5) - 0.51).abs() < 1e-12);

        let mut p = 0.5;
        for _ in 0..10_000 {
            let next = est.next_tick(p);
            assert!(next >= p);
            p = next;
        }
        assert!(p < 0.99);
        assert!(p > 0.98);
    }

    #[test]
    fn test_ticker_settles_below_ceiling() {
        let est = ProgressEstimator::default();
        let mut p = est.sending_end;
        loop {
            let next = est.next_tick(p);
            if next == p {
                break;
            }
            p = next;
        }
        assert!(p < est.ceiling);
        assert_eq!(est.next_tick(p), p);
    }

    #[test]
    fn test_tracker_holds_progress_below_ceiling() {
        let (tracker, mut rx) = tracker();
        tracker.begin_attempt(1);
        tracker.sending_progress(100, 100);
        for _ in 0..20_000 {
            tracker.tick();
        }
        assert!(tracker.progress() < 0.99);
        assert!(drain(&mut rx).iter().all(|e| e.progress < 0.99));

        tracker.succeed();
        assert_eq!(tracker.progress(), 1.0);
    }

    #[test]
    fn test_step_halves_near_ceiling() {
        let est = ProgressEstimator::default();
        let next = est.next_tick(0.985);
        assert!((next - 0.9875).abs() < 1e-12);
    }

    #[test]
    fn test_progress_is_monotonic_across_attempts() {
        let (tracker, mut rx) = tracker();

        tracker.begin_attempt(1);
        tracker.encoding_progress(100, 100);
        tracker.sending_started();
        tracker.sending_progress(80, 100);
        tracker.retrying(Duration::from_secs(2), "timed out");
        tracker.begin_attempt(2);
        tracker.encoding_progress(10, 100);
        tracker.sending_progress(10, 100);

        let events = drain(&mut rx);
        let mut last = 0.0;
        for event in &events {
            assert!(event.progress >= last, "progress went backwards: {:?}", events);
            last = event.progress;
        }
        assert!((tracker.progress() - 0.44).abs() < 1e-9);
    }

    #[test]
    fn test_only_success_reaches_one() {
        let (tracker, _rx) = tracker();
        tracker.begin_attempt(1);
        tracker.sending_progress(100, 100);
        for _ in 0..1000 {
            tracker.tick();
        }
        assert!(tracker.progress() < 1.0);

        tracker.fail("failed".to_string(), "boom");
        assert!(tracker.progress() < 1.0);
        assert_eq!(tracker.snapshot().phase, SessionPhase::Failed);

        let (tracker, _rx) = self::tracker();
        tracker.begin_attempt(1);
        tracker.succeed();
        assert_eq!(tracker.progress(), 1.0);
    }

    #[test]
    fn test_retrying_status_rounds_up_seconds() {
        let (tracker, mut rx) = tracker();
        tracker.begin_attempt(1);
        tracker.retrying(Duration::from_millis(1500), "reset");

        let events = drain(&mut rx);
        let retrying = events.last().unwrap();
        assert_eq!(retrying.phase, SessionPhase::Retrying);
        assert_eq!(retrying.status, "Connection issue. Retrying in 2s...");
        assert_eq!(retrying.error.as_deref(), Some("reset"));
    }

    #[test]
    fn test_snapshot_tracks_attempts_and_errors() {
        let (tracker, _rx) = tracker();
        tracker.begin_attempt(1);
        tracker.retrying(Duration::from_secs(2), "timed out");
        tracker.begin_attempt(2);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.phase, SessionPhase::Encoding);
        assert_eq!(snapshot.last_error.as_deref(), Some("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_on_cancel() {
        let (tx, _rx) = broadcast::channel(1024);
        let tracker = std::sync::Arc::new(SessionTracker::new(
            RequestId::new(),
            ProgressEstimator::default(),
            tx,
        ));
        tracker.begin_attempt(1);
        tracker.awaiting_response();

        let stop = CancellationToken::new();
        let handle = tokio::spawn({
            let tracker = tracker.clone();
            let stop = stop.clone();
            async move { run_ticker(&tracker, &stop).await }
        });

        tokio::time::sleep(Duration::from_millis(1250)).await;
        stop.cancel();
        handle.await.unwrap();

        let frozen = tracker.progress();
        assert!((frozen - 0.52).abs() < 1e-9, "got {}", frozen);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(tracker.progress(), frozen);
    }
}
