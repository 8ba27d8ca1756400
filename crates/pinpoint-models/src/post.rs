//! Post models.

use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::asset::LocalVideoAsset;
use crate::result::AnalysisResult;

/// Unique identifier for a post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    /// Generate a new random post ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PostId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the authenticated author.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct AuthorId(pub String);

impl AuthorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Author display metadata denormalized onto each post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AuthorProfile {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Everything the caller supplies to publish an analysed video.
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub video: LocalVideoAsset,
    /// JPEG bytes of the prepared thumbnail.
    pub thumbnail: Vec<u8>,
    pub result: AnalysisResult,
    pub caption: String,
    pub is_private: bool,
    pub match_date: Option<NaiveDate>,
}

/// A persisted post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Post {
    pub id: PostId,
    pub author_id: AuthorId,
    pub author: AuthorProfile,
    pub video_url: String,
    pub thumbnail_url: String,
    pub caption: String,
    /// Always the negation of the draft's private flag.
    pub is_public: bool,
    pub likes_count: u32,
    pub comments_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_date: Option<NaiveDate>,
    pub stats: AnalysisResult,
    pub created_at: DateTime<Utc>,
}
