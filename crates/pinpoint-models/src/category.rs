//! Action categories reported by the analysis service.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The fixed statistic set tracked for every analysis.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Serve,
    Receive,
    Set,
    Spike,
    Block,
    Dig,
}

impl ActionCategory {
    /// All categories in display order.
    pub const ALL: [ActionCategory; 6] = [
        ActionCategory::Serve,
        ActionCategory::Receive,
        ActionCategory::Set,
        ActionCategory::Spike,
        ActionCategory::Block,
        ActionCategory::Dig,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionCategory::Serve => "serve",
            ActionCategory::Receive => "receive",
            ActionCategory::Set => "set",
            ActionCategory::Spike => "spike",
            ActionCategory::Block => "block",
            ActionCategory::Dig => "dig",
        }
    }

    /// Look up a category by its wire name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// Upper end of the display scale. Not a validation bound.
    pub fn display_max(&self) -> u32 {
        match self {
            ActionCategory::Serve => 30,
            ActionCategory::Receive => 40,
            ActionCategory::Set => 40,
            ActionCategory::Spike => 30,
            ActionCategory::Block => 20,
            ActionCategory::Dig => 40,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionCategory::Serve => "Serves",
            ActionCategory::Receive => "Receives",
            ActionCategory::Set => "Sets",
            ActionCategory::Spike => "Spikes",
            ActionCategory::Block => "Blocks",
            ActionCategory::Dig => "Digs",
        }
    }
}
