//! Normalizes raw service counts onto the fixed category set.

use std::collections::HashMap;

use tracing::debug;

use pinpoint_models::{ActionCategory, AnalysisResult};

/// Maps raw `action_counts` into an [`AnalysisResult`].
///
/// Every category is present in the output. Missing categories default to
/// zero, negative counts are floored to zero, unknown names are dropped.
/// Counts above a category's display maximum are kept as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultMapper;

impl ResultMapper {
    pub fn map(raw: &HashMap<String, i64>) -> AnalysisResult {
        let mut totals: HashMap<ActionCategory, u64> = HashMap::new();

        for (name, &count) in raw {
            match ActionCategory::from_name(name) {
                Some(category) => {
                    if count < 0 {
                        debug!(category = name.as_str(), count, "Flooring negative count to zero");
                    }
                    let total = totals.entry(category).or_default();
                    *total = total.saturating_add(count.max(0) as u64);
                }
                None => debug!(category = name.as_str(), count, "Ignoring unknown category"),
            }
        }

        AnalysisResult::from_counts(|category| {
            let total = totals.get(&category).copied().unwrap_or(0);
            u32::try_from(total).unwrap_or(u32::MAX)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, i64)]) -> HashMap<String, i64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_empty_counts_yield_zero_everywhere() {
        let result = ResultMapper::map(&HashMap::new());
        assert_eq!(result.stats().len(), ActionCategory::ALL.len());
        for category in ActionCategory::ALL {
            assert_eq!(result.count(category), 0);
        }
    }

    #[test]
    fn test_missing_categories_default_to_zero() {
        let result = ResultMapper::map(&raw(&[("serve", 5), ("dig", 12)]));
        assert_eq!(result.count(ActionCategory::Serve), 5);
        assert_eq!(result.count(ActionCategory::Dig), 12);
        assert_eq!(result.count(ActionCategory::Block), 0);
    }

    #[test]
    fn test_values_above_display_max_are_kept() {
        let result = ResultMapper::map(&raw(&[("block", 55)]));
        let block = result
            .stats()
            .iter()
            .find(|s| s.category == ActionCategory::Block)
            .unwrap();
        assert_eq!(block.count, 55);
        assert_eq!(block.display_max, 20);
        assert!(block.display_fraction() > 1.0);
    }

    #[test]
    fn test_negative_and_unknown_counts() {
        let result = ResultMapper::map(&raw(&[("spike", -3), ("jump_float", 9)]));
        assert_eq!(result.count(ActionCategory::Spike), 0);
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_case_variants_saturate_instead_of_overflowing() {
        let result = ResultMapper::map(&raw(&[
            ("serve", i64::MAX),
            ("Serve", i64::MAX),
            ("SERVE", i64::MAX),
        ]));
        assert_eq!(result.count(ActionCategory::Serve), u32::MAX);
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let result = ResultMapper::map(&raw(&[("Receive", 7)]));
        assert_eq!(result.count(ActionCategory::Receive), 7);
    }
}
