//! Firestore integration tests.
//!
//! Run against a real project or the emulator (`FIRESTORE_EMULATOR_HOST`).

use std::sync::Arc;

use pinpoint_firestore::{FirestoreClient, PostRepository};
use pinpoint_models::{ActionCategory, AnalysisResult, AuthorId, AuthorProfile, Post, PostId};

/// Test Firestore connection.
#[tokio::test]
#[ignore = "requires Firestore credentials"]
async fn test_firestore_connection() {
    dotenvy::dotenv().ok();

    let client = FirestoreClient::from_env()
        .await
        .expect("Failed to create Firestore client");

    // A missing document is not an error
    let result = client
        .get_document("_health", "_check")
        .await
        .expect("Failed to read health document");
    println!("Health check document exists: {}", result.is_some());
}

/// Test post and stats round trip.
#[tokio::test]
#[ignore = "requires Firestore credentials"]
async fn test_post_repository() {
    dotenvy::dotenv().ok();

    let client = FirestoreClient::from_env()
        .await
        .expect("Failed to create Firestore client");
    let repo = PostRepository::new(Arc::new(client));

    let author_id = AuthorId::new("test_user_integration");
    let profile = repo
        .author_profile(&author_id)
        .await
        .expect("Failed to read author profile");
    println!("Author profile: {:?}", profile);

    let post_id = PostId::new();
    let post = Post {
        id: post_id.clone(),
        author_id: author_id.clone(),
        author: AuthorProfile::default(),
        video_url: format!("https://media.example.com/videos/{}/{}.mp4", author_id, post_id),
        thumbnail_url: format!("https://media.example.com/thumbnails/{}/{}.jpg", author_id, post_id),
        caption: "Integration test post".to_string(),
        is_public: false,
        likes_count: 0,
        comments_count: 0,
        match_date: None,
        stats: AnalysisResult::from_counts(|c| if c == ActionCategory::Set { 9 } else { 0 }),
        created_at: chrono::Utc::now(),
    };

    repo.create_post(&post).await.expect("Failed to create post");
    repo.write_stats(&post.id, &author_id, &post.stats, post.created_at)
        .await
        .expect("Failed to write stats");
    println!("Created post: {}", post_id);

    let loaded = repo
        .get_post(&post_id)
        .await
        .expect("Failed to read post")
        .expect("Post not found");
    assert_eq!(loaded.video_url, post.video_url);
    assert_eq!(loaded.stats.count(ActionCategory::Set), 9);
}
