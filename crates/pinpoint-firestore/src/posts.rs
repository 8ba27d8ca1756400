//! Post repository.
//!
//! Documents:
//! - `users/{author_id}`: author display metadata (read only)
//! - `posts/{post_id}`: the post record with denormalized author fields
//! - `post_stats/{post_id}`: the analysis counts keyed to the post

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info};

use pinpoint_models::{
    ActionCategory, AnalysisResult, AuthorId, AuthorProfile, Post, PostId,
};

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::DocumentStore;
use crate::types::{get_field, Fields, FromFirestoreValue, ToFirestoreValue, Value};

pub const USERS_COLLECTION: &str = "users";
pub const POSTS_COLLECTION: &str = "posts";
pub const POST_STATS_COLLECTION: &str = "post_stats";

/// Repository for posts and their stats records.
#[derive(Clone)]
pub struct PostRepository {
    store: Arc<dyn DocumentStore>,
}

impl PostRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Author display metadata. A missing user document yields an empty profile.
    pub async fn author_profile(&self, author_id: &AuthorId) -> FirestoreResult<AuthorProfile> {
        let Some(fields) = self.store.get(USERS_COLLECTION, author_id.as_str()).await? else {
            debug!(author_id = %author_id, "No user document, using empty profile");
            return Ok(AuthorProfile::default());
        };

        Ok(AuthorProfile {
            display_name: get_field::<String>(&fields, "display_name").unwrap_or_default(),
            avatar_url: get_field::<String>(&fields, "avatar_url").filter(|s| !s.is_empty()),
        })
    }

    /// Create the post document. Fails with `AlreadyExists` if the ID is taken.
    pub async fn create_post(&self, post: &Post) -> FirestoreResult<()> {
        self.store
            .create(POSTS_COLLECTION, post.id.as_str(), post_to_fields(post))
            .await?;
        info!(post_id = %post.id, author_id = %post.author_id, "Created post");
        Ok(())
    }

    /// Write the stats record for a post.
    pub async fn write_stats(
        &self,
        post_id: &PostId,
        author_id: &AuthorId,
        result: &AnalysisResult,
        created_at: DateTime<Utc>,
    ) -> FirestoreResult<()> {
        let mut fields = Fields::new();
        fields.insert("post_id".to_string(), post_id.as_str().to_firestore_value());
        fields.insert("author_id".to_string(), author_id.as_str().to_firestore_value());
        fields.insert("counts".to_string(), result.to_count_map().to_firestore_value());
        fields.insert("total_actions".to_string(), result.total().to_firestore_value());
        fields.insert("created_at".to_string(), created_at.to_firestore_value());

        self.store
            .merge(POST_STATS_COLLECTION, post_id.as_str(), fields)
            .await?;
        debug!(post_id = %post_id, total = result.total(), "Wrote post stats");
        Ok(())
    }

    /// Read a post together with its stats record.
    pub async fn get_post(&self, post_id: &PostId) -> FirestoreResult<Option<Post>> {
        let Some(fields) = self.store.get(POSTS_COLLECTION, post_id.as_str()).await? else {
            return Ok(None);
        };

        let stats = match self.store.get(POST_STATS_COLLECTION, post_id.as_str()).await? {
            Some(stats) => stats_from_fields(&stats),
            None => AnalysisResult::empty(),
        };

        post_from_fields(post_id, &fields, stats).map(Some)
    }
}

/// Stored as a timestamp at UTC midnight.
fn match_date_value(date: NaiveDate) -> Value {
    date.and_time(NaiveTime::MIN).and_utc().to_firestore_value()
}

fn post_to_fields(post: &Post) -> Fields {
    let mut fields = Fields::new();
    fields.insert("author_id".to_string(), post.author_id.as_str().to_firestore_value());
    fields.insert("author_name".to_string(), post.author.display_name.as_str().to_firestore_value());
    fields.insert("author_avatar_url".to_string(), post.author.avatar_url.clone().to_firestore_value());
    fields.insert("video_url".to_string(), post.video_url.as_str().to_firestore_value());
    fields.insert("thumbnail_url".to_string(), post.thumbnail_url.as_str().to_firestore_value());
    fields.insert("caption".to_string(), post.caption.as_str().to_firestore_value());
    fields.insert("is_public".to_string(), post.is_public.to_firestore_value());
    fields.insert("likes_count".to_string(), post.likes_count.to_firestore_value());
    fields.insert("comments_count".to_string(), post.comments_count.to_firestore_value());
    if let Some(date) = post.match_date {
        fields.insert("match_date".to_string(), match_date_value(date));
    }
    fields.insert("created_at".to_string(), post.created_at.to_firestore_value());
    fields
}

fn post_from_fields(post_id: &PostId, fields: &Fields, stats: AnalysisResult) -> FirestoreResult<Post> {
    let required = |name: &str| {
        get_field::<String>(fields, name).ok_or_else(|| {
            FirestoreError::InvalidResponse(format!("post {} missing field {}", post_id, name))
        })
    };

    Ok(Post {
        id: post_id.clone(),
        author_id: AuthorId::new(required("author_id")?),
        author: AuthorProfile {
            display_name: get_field::<String>(fields, "author_name").unwrap_or_default(),
            avatar_url: get_field::<String>(fields, "author_avatar_url"),
        },
        video_url: required("video_url")?,
        thumbnail_url: required("thumbnail_url")?,
        caption: get_field::<String>(fields, "caption").unwrap_or_default(),
        is_public: get_field::<bool>(fields, "is_public").unwrap_or(false),
        likes_count: get_field::<u32>(fields, "likes_count").unwrap_or(0),
        comments_count: get_field::<u32>(fields, "comments_count").unwrap_or(0),
        match_date: get_field::<DateTime<Utc>>(fields, "match_date").map(|ts| ts.date_naive()),
        stats,
        created_at: get_field::<DateTime<Utc>>(fields, "created_at").ok_or_else(|| {
            FirestoreError::InvalidResponse(format!("post {} missing created_at", post_id))
        })?,
    })
}

fn stats_from_fields(fields: &Fields) -> AnalysisResult {
    let counts: HashMap<String, u32> = fields
        .get("counts")
        .and_then(Value::as_map)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| u32::from_firestore_value(v).map(|n| (k.clone(), n)))
                .collect()
        })
        .unwrap_or_default();

    AnalysisResult::from_counts(|category: ActionCategory| {
        counts.get(category.as_str()).copied().unwrap_or(0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        docs: Mutex<HashMap<(String, String), Fields>>,
    }

    impl MemoryStore {
        fn doc(&self, collection: &str, id: &str) -> Option<Fields> {
            self.docs
                .lock()
                .unwrap()
                .get(&(collection.to_string(), id.to_string()))
                .cloned()
        }
    }

    #[async_trait]
    impl DocumentStore for MemoryStore {
        async fn get(&self, collection: &str, doc_id: &str) -> FirestoreResult<Option<Fields>> {
            Ok(self.doc(collection, doc_id))
        }

        async fn create(&self, collection: &str, doc_id: &str, fields: Fields) -> FirestoreResult<()> {
            let mut docs = self.docs.lock().unwrap();
            let key = (collection.to_string(), doc_id.to_string());
            if docs.contains_key(&key) {
                return Err(FirestoreError::AlreadyExists(doc_id.to_string()));
            }
            docs.insert(key, fields);
            Ok(())
        }

        async fn merge(&self, collection: &str, doc_id: &str, fields: Fields) -> FirestoreResult<()> {
            self.docs
                .lock()
                .unwrap()
                .entry((collection.to_string(), doc_id.to_string()))
                .or_default()
                .extend(fields);
            Ok(())
        }
    }

    fn sample_post(id: &PostId) -> Post {
        let mut raw = HashMap::new();
        raw.insert(ActionCategory::Serve, 4);
        raw.insert(ActionCategory::Spike, 35);

        Post {
            id: id.clone(),
            author_id: AuthorId::new("u1"),
            author: AuthorProfile {
                display_name: "Kai".to_string(),
                avatar_url: None,
            },
            video_url: "https://media.example.com/videos/u1/p1.mp4".to_string(),
            thumbnail_url: "https://media.example.com/thumbnails/u1/p1.jpg".to_string(),
            caption: "Semi final".to_string(),
            is_public: true,
            likes_count: 0,
            comments_count: 0,
            match_date: NaiveDate::from_ymd_opt(2026, 3, 14),
            stats: AnalysisResult::from_counts(|c| raw.get(&c).copied().unwrap_or(0)),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_user_yields_empty_profile() {
        let repo = PostRepository::new(Arc::new(MemoryStore::default()));
        let profile = repo.author_profile(&AuthorId::new("ghost")).await.unwrap();
        assert_eq!(profile, AuthorProfile::default());
    }

    #[tokio::test]
    async fn test_author_profile_reads_user_document() {
        let store = Arc::new(MemoryStore::default());
        let mut user = Fields::new();
        user.insert("display_name".to_string(), "Kai".to_firestore_value());
        user.insert("avatar_url".to_string(), "https://img/kai.png".to_firestore_value());
        store.merge(USERS_COLLECTION, "u1", user).await.unwrap();

        let repo = PostRepository::new(store);
        let profile = repo.author_profile(&AuthorId::new("u1")).await.unwrap();
        assert_eq!(profile.display_name, "Kai");
        assert_eq!(profile.avatar_url.as_deref(), Some("https://img/kai.png"));
    }

    #[tokio::test]
    async fn test_create_post_document_layout() {
        let store = Arc::new(MemoryStore::default());
        let repo = PostRepository::new(store.clone());
        let id = PostId::from_string("p1");
        repo.create_post(&sample_post(&id)).await.unwrap();

        let doc = store.doc(POSTS_COLLECTION, "p1").unwrap();
        assert_eq!(get_field::<String>(&doc, "author_id").as_deref(), Some("u1"));
        assert_eq!(get_field::<bool>(&doc, "is_public"), Some(true));
        assert_eq!(get_field::<u32>(&doc, "likes_count"), Some(0));
        assert_eq!(
            doc.get("match_date"),
            Some(&Value::TimestampValue("2026-03-14T00:00:00+00:00".to_string()))
        );
        assert_eq!(doc.get("author_avatar_url"), Some(&Value::NullValue(())));

        let err = repo.create_post(&sample_post(&id)).await.unwrap_err();
        assert!(matches!(err, FirestoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_stats_record_and_read_back() {
        let store = Arc::new(MemoryStore::default());
        let repo = PostRepository::new(store.clone());
        let id = PostId::from_string("p1");
        let post = sample_post(&id);

        repo.create_post(&post).await.unwrap();
        repo.write_stats(&id, &post.author_id, &post.stats, post.created_at)
            .await
            .unwrap();

        let stats = store.doc(POST_STATS_COLLECTION, "p1").unwrap();
        assert_eq!(get_field::<u32>(&stats, "total_actions"), Some(39));

        let loaded = repo.get_post(&id).await.unwrap().unwrap();
        assert_eq!(loaded.stats, post.stats);
        assert_eq!(loaded.stats.count(ActionCategory::Spike), 35);
        assert_eq!(loaded.match_date, post.match_date);
        assert_eq!(loaded.video_url, post.video_url);

        assert!(repo.get_post(&PostId::from_string("nope")).await.unwrap().is_none());
    }
}
