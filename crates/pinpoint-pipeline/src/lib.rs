//! Video analysis pipeline.
//!
//! Wires media preparation, the resilient analysis upload and post
//! publishing together behind [`AnalysisPipeline`].

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod logging;
pub mod persister;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use events::{EventBus, PostCreated};
pub use identity::{IdentityProvider, StaticIdentity};
pub use logging::SessionLogger;
pub use persister::PostPersister;
pub use pipeline::AnalysisPipeline;
