//! Analysis service HTTP client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Client;
use tokio::time::Instant;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use pinpoint_models::RetryPolicy;

use crate::encoder::{MultipartSpool, DEFAULT_CHUNK_SIZE};
use crate::error::{InferenceError, InferenceResult, TransportError};
use crate::transport::{ByteProgress, InferenceTransport};
use crate::types::{HealthResponse, TransportResponse};

/// Configuration for the analysis client.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Base URL of the analysis service
    pub base_url: String,
    /// Longest silence tolerated while the service works
    pub request_timeout: Duration,
    /// Upper bound on one whole exchange
    pub resource_timeout: Duration,
    pub connect_timeout: Duration,
    /// How long to keep waiting for a route before giving up on an attempt
    pub connectivity_wait: Duration,
    pub connectivity_poll: Duration,
    pub retry: RetryPolicy,
    /// Spool copy chunk size
    pub chunk_size: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: Duration::from_secs(600),
            resource_timeout: Duration::from_secs(1800),
            connect_timeout: Duration::from_secs(30),
            connectivity_wait: Duration::from_secs(60),
            connectivity_poll: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl InferenceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let secs = |name: &str, fallback: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        let max_attempts = std::env::var("INFERENCE_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.retry.max_attempts);
        let base_delay = std::env::var("INFERENCE_RETRY_BASE_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry.base_delay);
        let jitter = std::env::var("INFERENCE_RETRY_JITTER")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            base_url: std::env::var("INFERENCE_SERVICE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            request_timeout: secs("INFERENCE_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            resource_timeout: secs("INFERENCE_RESOURCE_TIMEOUT_SECS", defaults.resource_timeout),
            connect_timeout: defaults.connect_timeout,
            connectivity_wait: secs("INFERENCE_CONNECTIVITY_WAIT_SECS", defaults.connectivity_wait),
            connectivity_poll: defaults.connectivity_poll,
            retry: RetryPolicy::exponential(max_attempts, base_delay).with_jitter(jitter),
            chunk_size: defaults.chunk_size,
        }
    }
}

/// reqwest-backed [`InferenceTransport`].
pub struct InferenceClient {
    http: Client,
    config: InferenceConfig,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> InferenceResult<Self> {
        let http = Client::builder()
            .timeout(config.resource_timeout)
            .read_timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|e| InferenceError::Config(e.to_string()))?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> InferenceResult<Self> {
        Self::new(InferenceConfig::from_env())
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    fn analyze_url(&self) -> String {
        format!("{}/analyze", self.config.base_url)
    }

    /// Check if the analysis service is healthy.
    pub async fn health_check(&self) -> InferenceResult<bool> {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response
                    .json()
                    .await
                    .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Analysis service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Analysis service health check error: {}", e);
                Ok(false)
            }
        }
    }

    async fn send_once(
        &self,
        spool: &MultipartSpool,
        progress: ByteProgress,
    ) -> Result<TransportResponse, TransportError> {
        let file = tokio::fs::File::open(spool.path())
            .await
            .map_err(|e| TransportError::Other(format!("cannot reopen upload body: {}", e)))?;

        let total = spool.len();
        let sent = Arc::new(AtomicU64::new(0));
        let stream = ReaderStream::with_capacity(file, self.config.chunk_size).inspect_ok(move |chunk| {
            let len = chunk.len() as u64;
            let now = sent.fetch_add(len, Ordering::Relaxed) + len;
            progress(now, total);
        });

        let response = self
            .http
            .post(self.analyze_url())
            .header(CONTENT_TYPE, spool.content_type())
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;

        Ok(TransportResponse::new(status, body.to_vec()))
    }
}

#[async_trait]
impl InferenceTransport for InferenceClient {
    async fn send(
        &self,
        spool: &MultipartSpool,
        progress: ByteProgress,
    ) -> Result<TransportResponse, TransportError> {
        let deadline = Instant::now() + self.config.connectivity_wait;

        loop {
            match self.send_once(spool, progress.clone()).await {
                Err(TransportError::NoRoute(reason))
                    if Instant::now() + self.config.connectivity_poll < deadline =>
                {
                    debug!("No route to analysis service, waiting for connectivity: {}", reason);
                    tokio::time::sleep(self.config.connectivity_poll).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::MultipartEncoder;
    use pinpoint_models::{AnalysisRequest, LocalVideoAsset, PinpointSelection};
    use serial_test::serial;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn spool_in(dir: &TempDir) -> MultipartSpool {
        let video = dir.path().join("rally.mp4");
        tokio::fs::write(&video, vec![1u8; 4096]).await.unwrap();
        let asset = LocalVideoAsset::with_inferred_mime(&video, 4096).unwrap();
        let selection = PinpointSelection::new(320.0, 240.0, 640, 480).unwrap();
        let request = AnalysisRequest::new(asset, selection);
        MultipartEncoder::new(dir.path())
            .encode(&request, &CancellationToken::new(), |_, _| {})
            .await
            .unwrap()
    }

    fn config_for(base_url: String) -> InferenceConfig {
        InferenceConfig {
            base_url,
            connectivity_wait: Duration::ZERO,
            ..InferenceConfig::default()
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = InferenceConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(600));
        assert_eq!(config.resource_timeout, Duration::from_secs(1800));
        assert_eq!(config.connectivity_wait, Duration::from_secs(60));
        assert_eq!(config.retry.max_attempts, 3);
        assert!(!config.retry.jitter);
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("INFERENCE_SERVICE_URL", "https://analysis.example.com/");
        std::env::set_var("INFERENCE_MAX_ATTEMPTS", "5");
        std::env::set_var("INFERENCE_RETRY_BASE_MS", "250");
        std::env::set_var("INFERENCE_RETRY_JITTER", "true");

        let config = InferenceConfig::from_env();

        std::env::remove_var("INFERENCE_SERVICE_URL");
        std::env::remove_var("INFERENCE_MAX_ATTEMPTS");
        std::env::remove_var("INFERENCE_RETRY_BASE_MS");
        std::env::remove_var("INFERENCE_RETRY_JITTER");

        assert_eq!(config.base_url, "https://analysis.example.com");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert!(config.retry.jitter);
    }

    #[tokio::test]
    async fn test_streams_spool_and_reports_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(header_exists("content-type"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"success":true,"action_counts":{}}"#))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir).await;
        let client = InferenceClient::new(config_for(server.uri())).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let progress: ByteProgress = {
            let seen = seen.clone();
            Arc::new(move |sent, total| seen.lock().unwrap().push((sent, total)))
        };

        let response = client.send(&spool, progress).await.unwrap();
        assert_eq!(response.status, 200);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.last().copied(), Some((spool.len(), spool.len())));

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"x\"\r\n\r\n0.5000"));
        assert_eq!(requests[0].body.len() as u64, spool.len());
    }

    #[tokio::test]
    async fn test_non_success_status_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir).await;
        let client = InferenceClient::new(config_for(server.uri())).unwrap();

        let response = client.send(&spool, Arc::new(|_, _| {})).await.unwrap();
        assert_eq!(response.status, 502);
        assert_eq!(response.body, b"bad gateway");
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir).await;
        let client = InferenceClient::new(InferenceConfig {
            request_timeout: Duration::from_millis(200),
            resource_timeout: Duration::from_millis(300),
            ..config_for(server.uri())
        })
        .unwrap();

        let err = client.send(&spool, Arc::new(|_, _| {})).await.unwrap_err();
        assert!(matches!(err, TransportError::TimedOut(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_no_route() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir).await;
        let client =
            InferenceClient::new(config_for("http://analysis.pinpoint.invalid".to_string())).unwrap();

        let err = client.send(&spool, Arc::new(|_, _| {})).await.unwrap_err();
        assert!(matches!(err, TransportError::NoRoute(_)), "got {:?}", err);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_refused_connection_is_terminal() {
        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir).await;
        let client = InferenceClient::new(config_for("http://127.0.0.1:1".to_string())).unwrap();

        let err = client.send(&spool, Arc::new(|_, _| {})).await.unwrap_err();
        assert!(matches!(err, TransportError::Other(_)), "got {:?}", err);
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_tls_handshake_failure_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let spool = spool_in(&dir).await;
        let https_uri = server.uri().replacen("http://", "https://", 1);
        let client = InferenceClient::new(config_for(https_uri)).unwrap();

        let err = client.send(&spool, Arc::new(|_, _| {})).await.unwrap_err();
        assert!(matches!(err, TransportError::Other(_)), "got {:?}", err);
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"ok"}"#))
            .mount(&server)
            .await;

        let client = InferenceClient::new(config_for(server.uri())).unwrap();
        assert!(client.health_check().await.unwrap());

        let down = InferenceClient::new(config_for("http://127.0.0.1:1".to_string())).unwrap();
        assert!(!down.health_check().await.unwrap());
    }
}
