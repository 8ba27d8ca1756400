//! Multipart/form-data body assembly into an on-disk spool.
//!
//! The video is copied in fixed-size chunks so peak memory stays bounded
//! regardless of the clip size. The spool is a [`NamedTempFile`] and is
//! removed when the returned [`MultipartSpool`] is dropped.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use pinpoint_models::AnalysisRequest;

use crate::error::{InferenceError, InferenceResult};

/// Chunk size used when copying the video into the spool.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Filename advertised for the video part.
pub const VIDEO_PART_FILENAME: &str = "video.mp4";

/// Content type advertised for the video part.
pub const VIDEO_PART_CONTENT_TYPE: &str = "video/mp4";

/// A fully written multipart body on disk.
#[derive(Debug)]
pub struct MultipartSpool {
    file: NamedTempFile,
    boundary: String,
    len: u64,
}

impl MultipartSpool {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Total body length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value for the request `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

/// Streams an [`AnalysisRequest`] into a [`MultipartSpool`].
#[derive(Debug, Clone)]
pub struct MultipartEncoder {
    spool_dir: PathBuf,
    chunk_size: usize,
}

impl MultipartEncoder {
    pub fn new(spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Write the multipart body for `request`.
    ///
    /// `on_progress` receives `(video_bytes_copied, video_bytes_total)`
    /// after every chunk.
    pub async fn encode<F>(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> InferenceResult<MultipartSpool>
    where
        F: FnMut(u64, u64),
    {
        let boundary = new_boundary();

        tokio::fs::create_dir_all(&self.spool_dir)
            .await
            .map_err(InferenceError::encoding)?;
        let file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".multipart")
            .tempfile_in(&self.spool_dir)
            .map_err(InferenceError::encoding)?;
        let mut out = tokio::fs::File::from_std(file.reopen().map_err(InferenceError::encoding)?);

        let normalized = request.selection().normalized();
        let width = request.selection().frame_width().to_string();
        let height = request.selection().frame_height().to_string();

        let mut written: u64 = 0;
        for (name, value) in [
            ("x", normalized.x_field()),
            ("y", normalized.y_field()),
            ("width", width),
            ("height", height),
        ] {
            written += write_all(&mut out, text_part(&boundary, name, &value).as_bytes()).await?;
        }

        written += write_all(&mut out, video_part_header(&boundary).as_bytes()).await?;

        let mut source = tokio::fs::File::open(request.asset().path())
            .await
            .map_err(InferenceError::encoding)?;
        let total = request.asset().byte_len();
        let mut buf = vec![0u8; self.chunk_size];
        let mut copied: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(InferenceError::Cancelled);
            }

            let n = source.read(&mut buf).await.map_err(InferenceError::encoding)?;
            if n == 0 {
                break;
            }
            written += write_all(&mut out, &buf[..n]).await?;
            copied += n as u64;
            on_progress(copied, total.max(copied));
        }

        written += write_all(&mut out, closing(&boundary).as_bytes()).await?;
        out.flush().await.map_err(InferenceError::encoding)?;

        debug!(
            request_id = %request.id(),
            spool = %file.path().display(),
            video_bytes = copied,
            body_bytes = written,
            "Multipart body spooled"
        );

        Ok(MultipartSpool {
            file,
            boundary,
            len: written,
        })
    }
}

async fn write_all(out: &mut tokio::fs::File, bytes: &[u8]) -> InferenceResult<u64> {
    out.write_all(bytes).await.map_err(InferenceError::encoding)?;
    Ok(bytes.len() as u64)
}

fn new_boundary() -> String {
    format!("----pinpoint-{}", Uuid::new_v4().simple())
}

fn text_part(boundary: &str, name: &str, value: &str) -> String {
    format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
    )
}

fn video_part_header(boundary: &str) -> String {
    format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"{VIDEO_PART_FILENAME}\"\r\nContent-Type: {VIDEO_PART_CONTENT_TYPE}\r\n\r\n"
    )
}

fn closing(boundary: &str) -> String {
    format!("\r\n--{boundary}--\r\n")
}
