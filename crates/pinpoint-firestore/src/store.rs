//! Document store abstraction.

use async_trait::async_trait;

use crate::error::FirestoreResult;
use crate::types::Fields;

/// Minimal document operations the post repository needs.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document's fields, `None` if it does not exist.
    async fn get(&self, collection: &str, doc_id: &str) -> FirestoreResult<Option<Fields>>;

    /// Create a new document; fails if one already exists under `doc_id`.
    async fn create(&self, collection: &str, doc_id: &str, fields: Fields) -> FirestoreResult<()>;

    /// Upsert the given fields, leaving other fields of an existing document untouched.
    async fn merge(&self, collection: &str, doc_id: &str, fields: Fields) -> FirestoreResult<()>;
}
