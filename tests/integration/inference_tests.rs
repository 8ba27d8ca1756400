//! Analysis service integration tests.

use pinpoint_inference::InferenceClient;

/// Test the analysis service health endpoint.
#[tokio::test]
#[ignore = "requires a running analysis service"]
async fn test_inference_health() {
    dotenvy::dotenv().ok();

    let client = InferenceClient::from_env().expect("Failed to create inference client");
    let healthy = client.health_check().await.expect("Health check failed");
    assert!(healthy, "service at {} is not healthy", client.config().base_url);
}
