//! R2 storage integration tests.

use pinpoint_models::{AuthorId, PostId};
use pinpoint_storage::{thumbnail_key, ObjectStore, R2Client, StorageError, THUMBNAIL_CONTENT_TYPE};

/// Test R2 connectivity.
#[tokio::test]
#[ignore = "requires R2 credentials"]
async fn test_r2_connection() {
    dotenvy::dotenv().ok();

    let client = R2Client::from_env().await.expect("Failed to create R2 client");
    client
        .check_connectivity()
        .await
        .expect("R2 connectivity check failed");
}

/// Test upload followed by reference lookup.
#[tokio::test]
#[ignore = "requires R2 credentials"]
async fn test_put_and_reference() {
    dotenvy::dotenv().ok();

    let client = R2Client::from_env().await.expect("Failed to create R2 client");
    let key = thumbnail_key(&AuthorId::new("test_user_integration"), &PostId::new()).unwrap();

    let missing = client.retrievable_reference(&key).await;
    assert!(matches!(missing, Err(StorageError::NotFound(_))));

    client
        .put_bytes(&key, vec![0xFF, 0xD8, 0xFF, 0xD9], THUMBNAIL_CONTENT_TYPE)
        .await
        .expect("Upload failed");

    let reference = client
        .retrievable_reference(&key)
        .await
        .expect("Failed to resolve reference");
    assert!(reference.contains(&key));
    println!("Reference: {}", reference);
}
