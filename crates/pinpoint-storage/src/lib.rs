//! Cloudflare R2 storage for post media.
//!
//! This crate provides:
//! - The [`ObjectStore`] seam used by the post persister
//! - An R2-backed implementation with public or presigned references
//! - The `{collection}/{owner}/{object}` key layout

pub mod client;
pub mod error;
pub mod keys;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::{object_key, thumbnail_key, video_extension, video_key, THUMBNAIL_CONTENT_TYPE};
pub use store::ObjectStore;
