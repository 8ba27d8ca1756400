//! FFmpeg CLI wrapper for preparing captured videos.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with timeouts
//! - FFprobe metadata extraction
//! - Single-frame thumbnail extraction
//! - The [`MediaPreparer`] used before an analysis upload

pub mod command;
pub mod error;
pub mod preparer;
pub mod probe;
pub mod thumbnail;

pub use command::{FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use preparer::{FfmpegMediaPreparer, MediaPreparer, PreparedMedia, Thumbnail};
pub use probe::{probe_video, VideoInfo};
pub use thumbnail::{extract_thumbnail, THUMBNAIL_OFFSET_SECS};
