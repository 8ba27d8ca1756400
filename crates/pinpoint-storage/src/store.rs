//! Object store abstraction used by the post persister.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Binary object storage with retrievable references.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, replacing any existing object.
    async fn put_bytes(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    /// Stream a local file to `key`.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<()>;

    /// A URL from which the stored object can be fetched.
    ///
    /// Fails with `NotFound` if nothing is stored under `key`.
    async fn retrievable_reference(&self, key: &str) -> StorageResult<String>;
}
