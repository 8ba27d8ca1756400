//! Object key layout: `{collection}/{owner}/{object}[.ext]`.

use pinpoint_models::{AuthorId, PostId};

use crate::error::{StorageError, StorageResult};

pub const VIDEOS_COLLECTION: &str = "videos";
pub const THUMBNAILS_COLLECTION: &str = "thumbnails";

pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

fn validate_segment(segment: &str) -> StorageResult<&str> {
    if segment.is_empty() || segment.contains('/') || segment == "." || segment == ".." {
        return Err(StorageError::invalid_key(format!(
            "invalid key segment {:?}",
            segment
        )));
    }
    Ok(segment)
}

/// Build a key from its parts.
pub fn object_key(
    collection: &str,
    owner_id: &str,
    object_id: &str,
    extension: Option<&str>,
) -> StorageResult<String> {
    let collection = validate_segment(collection)?;
    let owner_id = validate_segment(owner_id)?;
    let object_id = validate_segment(object_id)?;

    Ok(match extension {
        Some(ext) => format!("{}/{}/{}.{}", collection, owner_id, object_id, ext),
        None => format!("{}/{}/{}", collection, owner_id, object_id),
    })
}

/// Extension stored for a video of the given MIME type; unknown types are `mp4`.
pub fn video_extension(mime_type: &str) -> &'static str {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "video/quicktime" => "mov",
        "video/x-m4v" => "m4v",
        "video/webm" => "webm",
        "video/x-matroska" => "mkv",
        _ => "mp4",
    }
}

/// `videos/{author}/{post}.{ext}`, extension derived from `mime_type`.
pub fn video_key(author: &AuthorId, post: &PostId, mime_type: &str) -> StorageResult<String> {
    object_key(
        VIDEOS_COLLECTION,
        author.as_str(),
        post.as_str(),
        Some(video_extension(mime_type)),
    )
}

/// `thumbnails/{author}/{post}.jpg`
pub fn thumbnail_key(author: &AuthorId, post: &PostId) -> StorageResult<String> {
    object_key(THUMBNAILS_COLLECTION, author.as_str(), post.as_str(), Some("jpg"))
}
