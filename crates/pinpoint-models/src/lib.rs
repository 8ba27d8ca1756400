//! Shared data models for the Pinpoint analysis pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Local video assets and pinpoint selections
//! - Analysis requests and mapped results
//! - Posts and author metadata
//! - Upload session phases and events
//! - Retry policies shared by the network and storage layers

pub mod asset;
pub mod category;
pub mod error;
pub mod post;
pub mod request;
pub mod result;
pub mod retry;
pub mod selection;
pub mod session;

// Re-export common types
pub use asset::{LocalVideoAsset, DEFAULT_VIDEO_MIME};
pub use category::ActionCategory;
pub use error::{ModelError, ModelResult};
pub use post::{AuthorId, AuthorProfile, Post, PostDraft, PostId};
pub use request::{AnalysisRequest, RequestId};
pub use result::{AnalysisResult, CategoryStat};
pub use retry::{Backoff, RetryPolicy};
pub use selection::{NormalizedPoint, PinpointSelection};
pub use session::{SessionEvent, SessionPhase, UploadSession};
