//! Firestore REST API client.
//!
//! This crate provides:
//! - Post repository for posts, their stats records and author metadata
//! - Service account authentication via gcp_auth, or the local emulator
//! - Merge updates and retry logic

pub mod client;
pub mod error;
pub mod metrics;
pub mod posts;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use posts::{PostRepository, POSTS_COLLECTION, POST_STATS_COLLECTION, USERS_COLLECTION};
pub use retry::RetryConfig;
pub use store::DocumentStore;
pub use token_cache::TokenSource;
pub use types::{Document, Fields, FromFirestoreValue, ToFirestoreValue, Value};
