//! Analysis service request/response types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use pinpoint_models::AnalysisResult;

/// Body returned by `POST /analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    /// False means the service ran but could not produce counts
    pub success: bool,
    /// Raw category name to count
    #[serde(default)]
    pub action_counts: HashMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crops_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_crops: Option<u64>,
    /// Failure reason, when the service provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Raw HTTP exchange result handed back by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Mapped outcome of a successful analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    /// Transport attempts used, including the successful one
    pub attempts: u32,
    pub crops_url: Option<String>,
    pub total_crops: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_fields_are_ignored() {
        let body = r#"{
            "success": true,
            "action_counts": {"serve": 4, "spike": 2},
            "crops_url": "https://cdn.example.com/crops/abc",
            "total_crops": 17,
            "model": "v3"
        }"#;

        let parsed: AnalyzeResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.action_counts["serve"], 4);
        assert_eq!(parsed.total_crops, Some(17));
    }

    #[test]
    fn test_missing_success_flag_is_rejected() {
        let body = r#"{"action_counts": {}}"#;
        tokio_test::assert_err!(serde_json::from_str::<AnalyzeResponse>(body));
    }
}
