//! Client for the action-recognition analysis service.
//!
//! A request is spooled to disk as a multipart body, streamed to
//! `POST /analyze`, and retried on transient network failures. Progress is
//! published as [`SessionEvent`](pinpoint_models::SessionEvent)s while the
//! exchange runs, and the raw category counts are mapped onto the fixed
//! category set.

pub mod client;
pub mod encoder;
pub mod error;
pub mod mapper;
pub mod progress;
pub mod transport;
pub mod types;
pub mod uploader;

pub use client::{InferenceClient, InferenceConfig};
pub use encoder::{MultipartEncoder, MultipartSpool, DEFAULT_CHUNK_SIZE};
pub use error::{ErrorClass, InferenceError, InferenceResult, TransportError};
pub use mapper::ResultMapper;
pub use progress::{run_ticker, ProgressEstimator, SessionTracker};
pub use transport::{ByteProgress, InferenceTransport};
pub use types::{AnalysisOutcome, AnalyzeResponse, HealthResponse, TransportResponse};
pub use uploader::ResilientUploader;
