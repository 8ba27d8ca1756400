//! Local video asset.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// MIME type sent for the video part when nothing more specific is known.
pub const DEFAULT_VIDEO_MIME: &str = "video/mp4";

/// A video file on local disk, fixed once analysis starts.
///
/// Fields are private so that a request holding an asset cannot be altered
/// between retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct LocalVideoAsset {
    path: PathBuf,
    byte_len: u64,
    mime_type: String,
}

impl LocalVideoAsset {
    /// Create an asset from an already-validated path and length.
    pub fn new(path: impl Into<PathBuf>, byte_len: u64, mime_type: impl Into<String>) -> ModelResult<Self> {
        let path = path.into();
        if byte_len == 0 {
            return Err(ModelError::EmptyAsset(path.display().to_string()));
        }

        Ok(Self {
            path,
            byte_len,
            mime_type: mime_type.into(),
        })
    }

    /// Create an asset, inferring the MIME type from the file extension.
    pub fn with_inferred_mime(path: impl Into<PathBuf>, byte_len: u64) -> ModelResult<Self> {
        let path = path.into();
        let mime = mime_for_path(&path);
        Self::new(path, byte_len, mime)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// File name used for the multipart part and storage objects.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "video.mp4".to_string())
    }
}

/// Guess a video MIME type from a file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("mov") => "video/quicktime",
        Some("m4v") => "video/x-m4v",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        _ => DEFAULT_VIDEO_MIME,
    }
}
