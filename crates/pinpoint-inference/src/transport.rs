//! Transport seam between the uploader and the network.

use std::sync::Arc;

use async_trait::async_trait;

use crate::encoder::MultipartSpool;
use crate::error::TransportError;
use crate::types::TransportResponse;

/// Receives `(bytes_sent, bytes_total)` while a body streams out.
pub type ByteProgress = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// One HTTP exchange with the analysis service.
///
/// Implementations send the spooled body once and return whatever status
/// the service answered with. Retrying is the caller's concern.
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    async fn send(
        &self,
        spool: &MultipartSpool,
        progress: ByteProgress,
    ) -> Result<TransportResponse, TransportError>;
}
