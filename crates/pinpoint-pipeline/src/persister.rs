//! Publishes an analysed video as a post.
//!
//! Steps run strictly in order and the first failure stops the rest:
//!
//! 1. upload the video to `videos/{author}/{post}.mp4` and resolve its reference
//! 2. upload the thumbnail to `thumbnails/{author}/{post}.jpg` and resolve its reference
//! 3. read the author's display metadata
//! 4. write `posts/{post}`, then `post_stats/{post}`
//! 5. publish [`PostCreated`]
//!
//! Media already uploaded is left in place when a later step fails.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tracing::{warn, Instrument};

use pinpoint_firestore::PostRepository;
use pinpoint_models::{Post, PostDraft, PostId, RetryPolicy};
use pinpoint_storage::{
    thumbnail_key, video_key, ObjectStore, StorageResult, THUMBNAIL_CONTENT_TYPE,
};

use crate::error::{PipelineError, PipelineResult};
use crate::events::{EventBus, PostCreated};
use crate::identity::IdentityProvider;
use crate::logging::SessionLogger;

pub struct PostPersister {
    objects: Arc<dyn ObjectStore>,
    posts: PostRepository,
    identity: Arc<dyn IdentityProvider>,
    events: EventBus,
    retry: RetryPolicy,
}

impl PostPersister {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        posts: PostRepository,
        identity: Arc<dyn IdentityProvider>,
        events: EventBus,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            objects,
            posts,
            identity,
            events,
            retry,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Store the draft's media and metadata and announce the new post.
    pub async fn persist(&self, draft: PostDraft) -> PipelineResult<Post> {
        let author_id = self
            .identity
            .current_author()
            .ok_or(PipelineError::AuthenticationMissing)?;
        if draft.thumbnail.is_empty() {
            return Err(PipelineError::invalid_draft("missing thumbnail"));
        }

        let post_id = PostId::new();
        let logger = SessionLogger::for_post(&post_id, "publish_post");
        let video_mime = draft.video.mime_type();
        let video_key = video_key(&author_id, &post_id, video_mime)?;
        let thumbnail_key = thumbnail_key(&author_id, &post_id)?;

        async {
            logger.log_start(&format!("{} for {}", draft.video.file_name(), author_id));

            self.with_storage_retry("upload_video", || {
                self.objects
                    .put_file(&video_key, draft.video.path(), video_mime)
            })
            .await?;
            let video_url = self
                .with_storage_retry("video_reference", || {
                    self.objects.retrievable_reference(&video_key)
                })
                .await?;
            logger.log_progress("video stored");

            self.with_storage_retry("upload_thumbnail", || {
                self.objects.put_bytes(
                    &thumbnail_key,
                    draft.thumbnail.clone(),
                    THUMBNAIL_CONTENT_TYPE,
                )
            })
            .await?;
            let thumbnail_url = self
                .with_storage_retry("thumbnail_reference", || {
                    self.objects.retrievable_reference(&thumbnail_key)
                })
                .await?;
            logger.log_progress("thumbnail stored");

            let author = self.posts.author_profile(&author_id).await?;

            let post = Post {
                id: post_id.clone(),
                author_id: author_id.clone(),
                author,
                video_url,
                thumbnail_url,
                caption: draft.caption.clone(),
                is_public: !draft.is_private,
                likes_count: 0,
                comments_count: 0,
                match_date: draft.match_date,
                stats: draft.result.clone(),
                created_at: Utc::now(),
            };

            self.posts.create_post(&post).await?;
            self.posts
                .write_stats(&post.id, &author_id, &post.stats, post.created_at)
                .await?;

            counter!("posts_published_total").increment(1);
            self.events.publish(PostCreated { post: post.clone() });
            logger.log_completion(&format!("post {} published", post.id));

            Ok::<_, PipelineError>(post)
        }
        .instrument(logger.create_span())
        .await
        .inspect_err(|e| logger.log_error(&e.to_string()))
    }

    /// Run a storage step, retrying only errors storage flags as transient.
    async fn with_storage_retry<T, F, Fut>(&self, step: &'static str, op: F) -> PipelineResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut attempt: u32 = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && self.retry.allows_retry_after(attempt) => {
                    let delay = self.retry.delay_before_retry(attempt);
                    warn!(
                        "{} attempt {} failed, retrying in {:?}: {}",
                        step, attempt, delay, e
                    );
                    counter!("storage_retries_total", "step" => step).increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    return Err(PipelineError::StorageRetriesExhausted {
                        step,
                        attempts: attempt,
                        last: e,
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
