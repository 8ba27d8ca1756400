//! Media preparation ahead of an analysis upload.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::{GenericImageView, ImageFormat};
use tracing::{debug, info};

use pinpoint_models::asset::mime_for_path;
use pinpoint_models::LocalVideoAsset;

use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};
use crate::thumbnail::{extract_thumbnail, THUMBNAIL_OFFSET_SECS};

/// A decoded still frame, JPEG-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Thumbnail {
    pub const CONTENT_TYPE: &'static str = "image/jpeg";
}

/// A validated asset with its thumbnail.
#[derive(Debug, Clone)]
pub struct PreparedMedia {
    pub asset: LocalVideoAsset,
    pub thumbnail: Thumbnail,
    pub info: VideoInfo,
}

/// Validates a local video and extracts a representative frame.
#[async_trait]
pub trait MediaPreparer: Send + Sync {
    async fn prepare(&self, path: &Path, declared_mime: Option<&str>) -> MediaResult<PreparedMedia>;
}

/// [`MediaPreparer`] backed by the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegMediaPreparer {
    work_dir: PathBuf,
    offset_secs: f64,
}

impl FfmpegMediaPreparer {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            offset_secs: THUMBNAIL_OFFSET_SECS,
        }
    }

    pub fn with_offset(mut self, offset_secs: f64) -> Self {
        self.offset_secs = offset_secs;
        self
    }

    /// Seek point for the still; short clips are sampled at their midpoint.
    fn seek_for(&self, duration: f64) -> f64 {
        if duration > 0.0 && duration <= self.offset_secs {
            duration / 2.0
        } else {
            self.offset_secs
        }
    }

    async fn validate_file(path: &Path) -> MediaResult<u64> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| MediaError::unreadable(format!("cannot open {}: {}", path.display(), e)))?;

        if !meta.is_file() {
            return Err(MediaError::unreadable(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        if meta.len() == 0 {
            return Err(MediaError::unreadable(format!("{} is empty", path.display())));
        }

        Ok(meta.len())
    }

    async fn grab_frame(&self, path: &Path, seek: f64) -> MediaResult<Thumbnail> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let frame_file = tempfile::Builder::new()
            .prefix("thumb-")
            .suffix(".jpg")
            .tempfile_in(&self.work_dir)?;

        extract_thumbnail(path, frame_file.path(), seek)
            .await
            .map_err(|e| match e {
                MediaError::FfmpegFailed { .. } => {
                    MediaError::unreadable(format!("no frame decoded near {:.1}s: {}", seek, e))
                }
                other => other,
            })?;

        let bytes = tokio::fs::read(frame_file.path()).await?;
        if bytes.is_empty() {
            return Err(MediaError::unreadable(format!(
                "no frame decoded near {:.1}s",
                seek
            )));
        }

        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg)
            .map_err(|e| MediaError::unreadable(format!("thumbnail is not a valid image: {}", e)))?;
        let (width, height) = decoded.dimensions();

        Ok(Thumbnail {
            bytes,
            width,
            height,
        })
    }
}

#[async_trait]
impl MediaPreparer for FfmpegMediaPreparer {
    async fn prepare(&self, path: &Path, declared_mime: Option<&str>) -> MediaResult<PreparedMedia> {
        let byte_len = Self::validate_file(path).await?;

        let info = probe_video(path).await.map_err(|e| match e {
            MediaError::FfprobeFailed { .. } | MediaError::JsonParse(_) => {
                MediaError::unreadable(format!("cannot probe {}: {}", path.display(), e))
            }
            other => other,
        })?;
        debug!(
            "Probed {}: {}x{} {:.2}s {}",
            path.display(),
            info.width,
            info.height,
            info.duration,
            info.codec
        );

        let seek = self.seek_for(info.duration);
        let thumbnail = self.grab_frame(path, seek).await?;

        let mime = declared_mime.unwrap_or_else(|| mime_for_path(path));
        let asset = LocalVideoAsset::new(path, byte_len, mime)
            .map_err(|e| MediaError::unreadable(e.to_string()))?;

        info!(
            "Prepared {} ({} bytes, thumbnail {}x{})",
            path.display(),
            byte_len,
            thumbnail.width,
            thumbnail.height
        );

        Ok(PreparedMedia {
            asset,
            thumbnail,
            info,
        })
    }
}
