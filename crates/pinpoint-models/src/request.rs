//! Analysis request.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::asset::LocalVideoAsset;
use crate::selection::PinpointSelection;

/// Unique identifier for an analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new random request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The unit submitted to the inference service.
///
/// Callers keep the request and hand the same value back to retry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisRequest {
    id: RequestId,
    asset: LocalVideoAsset,
    selection: PinpointSelection,
}

impl AnalysisRequest {
    pub fn new(asset: LocalVideoAsset, selection: PinpointSelection) -> Self {
        Self {
            id: RequestId::new(),
            asset,
            selection,
        }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn asset(&self) -> &LocalVideoAsset {
        &self.asset
    }

    pub fn selection(&self) -> &PinpointSelection {
        &self.selection
    }
}
