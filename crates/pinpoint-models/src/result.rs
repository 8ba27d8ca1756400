//! Mapped analysis results.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::category::ActionCategory;

/// Count for one category along with its display scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryStat {
    pub category: ActionCategory,
    pub count: u32,
    /// Presentation-only scale; `count` may exceed it.
    pub display_max: u32,
}

impl CategoryStat {
    /// Fraction of the display scale, unclamped.
    pub fn display_fraction(&self) -> f64 {
        if self.display_max == 0 {
            return 0.0;
        }
        self.count as f64 / self.display_max as f64
    }
}

/// Per-category action counts for one analysed video.
///
/// Always holds exactly one entry per [`ActionCategory`], in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    stats: Vec<CategoryStat>,
}

impl AnalysisResult {
    /// A result with every category at zero.
    pub fn empty() -> Self {
        Self::from_counts(|_| 0)
    }

    /// Build a result by asking for the count of each category.
    pub fn from_counts(mut count_for: impl FnMut(ActionCategory) -> u32) -> Self {
        let stats = ActionCategory::ALL
            .into_iter()
            .map(|category| CategoryStat {
                category,
                count: count_for(category),
                display_max: category.display_max(),
            })
            .collect();
        Self { stats }
    }

    pub fn stats(&self) -> &[CategoryStat] {
        &self.stats
    }

    pub fn count(&self, category: ActionCategory) -> u32 {
        self.stats
            .iter()
            .find(|s| s.category == category)
            .map(|s| s.count)
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.stats.iter().map(|s| s.count as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Category name to count, as stored alongside a post.
    pub fn to_count_map(&self) -> HashMap<String, u32> {
        self.stats
            .iter()
            .map(|s| (s.category.as_str().to_string(), s.count))
            .collect()
    }
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self::empty()
    }
}
