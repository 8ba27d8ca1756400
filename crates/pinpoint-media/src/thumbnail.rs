//! Thumbnail extraction.

use std::path::Path;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Offset into playback at which the thumbnail frame is taken.
pub const THUMBNAIL_OFFSET_SECS: f64 = 0.5;

/// Longest edge of the generated thumbnail.
pub const THUMBNAIL_MAX_EDGE: u32 = 720;

fn thumbnail_command(video_path: &Path, output_path: &Path, offset_secs: f64) -> FfmpegCommand {
    // Scale down only, keep aspect ratio, even dimensions for the encoder.
    let filter = format!(
        "scale='min({edge},iw)':'min({edge},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2",
        edge = THUMBNAIL_MAX_EDGE
    );

    FfmpegCommand::new(video_path, output_path)
        .seek(offset_secs)
        .single_frame()
        .video_filter(filter)
        .jpeg_quality(3)
        .log_level("error")
}

/// Extract a single JPEG frame at `offset_secs` into `output_path`.
pub async fn extract_thumbnail(
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    offset_secs: f64,
) -> MediaResult<()> {
    let cmd = thumbnail_command(video_path.as_ref(), output_path.as_ref(), offset_secs);
    FfmpegRunner::new().run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_command() {
        let cmd = thumbnail_command(Path::new("clip.mp4"), Path::new("thumb.jpg"), THUMBNAIL_OFFSET_SECS);
        let args = cmd.build_args();

        assert!(args.contains(&"0.500".to_string()));
        assert!(args.contains(&"-frames:v".to_string()));
        assert!(args.iter().any(|a| a.contains("720")));
    }
}
