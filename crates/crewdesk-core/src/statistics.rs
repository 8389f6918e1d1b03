//! Report activity statistics for one personnel member over a date range, and
//! the JSON snapshot stored on coach reports.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of entries in `top_categories`.
pub const TOP_CATEGORY_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: i64,
}

/// Occurrences of one category across a personnel member's report items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTally {
    pub id: i64,
    pub name: String,
    pub count: i64,
}

/// The persisted snapshot shape. Missing keys read as zero/empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    #[serde(default)]
    pub report_count: i64,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub top_categories: Vec<CategoryCount>,
}

impl StatisticsSnapshot {
    /// Build statistics from a report count and per-category tallies.
    /// `categories` is sorted by name; zero-count tallies are ignored.
    #[must_use]
    pub fn from_tallies(report_count: i64, tallies: &[CategoryTally]) -> Self {
        let mut categories: Vec<String> = tallies
            .iter()
            .filter(|t| t.count > 0)
            .map(|t| t.name.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Self {
            report_count,
            categories,
            top_categories: rank_top_categories(tallies),
        }
    }
}

/// The [`TOP_CATEGORY_LIMIT`] most frequent categories, count descending,
/// ties by category id ascending.
#[must_use]
pub fn rank_top_categories(tallies: &[CategoryTally]) -> Vec<CategoryCount> {
    let mut ranked: Vec<&CategoryTally> = tallies.iter().filter(|t| t.count > 0).collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then(a.id.cmp(&b.id)));
    ranked
        .into_iter()
        .take(TOP_CATEGORY_LIMIT)
        .map(|t| CategoryCount {
            name: t.name.clone(),
            count: t.count,
        })
        .collect()
}

/// Read a stored snapshot column.
///
/// `NULL` and `{}` are absent snapshots.
///
/// # Errors
///
/// Returns the deserialization error for a non-empty value that does not
/// have the snapshot shape. Callers treat that as absent too.
pub fn parse_snapshot(
    value: Option<&Value>,
) -> Result<Option<StatisticsSnapshot>, serde_json::Error> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) if map.is_empty() => Ok(None),
        Some(v) => StatisticsSnapshot::deserialize(v).map(Some),
    }
}

/// Statistics tagged with where they came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "statistics", rename_all = "snake_case")]
pub enum Statistics {
    /// Read verbatim from the snapshot written when the report was authored.
    Cached(StatisticsSnapshot),
    /// Aggregated from the live report tables.
    Computed(StatisticsSnapshot),
}

impl Statistics {
    #[must_use]
    pub fn snapshot(&self) -> &StatisticsSnapshot {
        match self {
            Self::Cached(s) | Self::Computed(s) => s,
        }
    }

    #[must_use]
    pub fn into_snapshot(self) -> StatisticsSnapshot {
        match self {
            Self::Cached(s) | Self::Computed(s) => s,
        }
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(id: i64, name: &str, count: i64) -> CategoryTally {
        CategoryTally {
            id,
            name: name.to_string(),
            count,
        }
    }

    #[test]
    fn empty_tallies_give_zero_statistics() {
        let stats = StatisticsSnapshot::from_tallies(0, &[]);
        assert_eq!(stats.report_count, 0);
        assert!(stats.categories.is_empty());
        assert!(stats.top_categories.is_empty());
    }

    #[test]
    fn top_categories_are_capped_and_non_increasing() {
        let tallies: Vec<CategoryTally> = (1..=8)
            .map(|i| tally(i, &format!("C{i}"), i % 4 + 1))
            .collect();
        let top = rank_top_categories(&tallies);
        assert_eq!(top.len(), TOP_CATEGORY_LIMIT);
        assert!(top.windows(2).all(|w| w[0].count >= w[1].count));
    }

    #[test]
    fn ties_are_broken_by_category_id() {
        let top = rank_top_categories(&[
            tally(3, "Sales", 2),
            tally(1, "Support", 2),
            tally(2, "Ops", 5),
        ]);
        let names: Vec<&str> = top.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Ops", "Support", "Sales"]);
    }

    #[test]
    fn categories_are_sorted_by_name() {
        let stats = StatisticsSnapshot::from_tallies(
            4,
            &[
                tally(1, "Marketing", 1),
                tally(2, "Admin", 3),
                tally(3, "Unused", 0),
            ],
        );
        assert_eq!(stats.categories, vec!["Admin", "Marketing"]);
        assert_eq!(stats.top_categories.len(), 2);
    }

    #[test]
    fn stored_snapshot_is_read_verbatim() {
        let json = serde_json::json!({
            "report_count": 5,
            "categories": ["A", "B"],
            "top_categories": [{"name": "A", "count": 3}]
        });
        let snapshot = parse_snapshot(Some(&json)).unwrap().expect("present");
        assert_eq!(snapshot.report_count, 5);
        assert_eq!(snapshot.categories, vec!["A", "B"]);
        assert_eq!(
            snapshot.top_categories,
            vec![CategoryCount {
                name: "A".to_string(),
                count: 3
            }]
        );
    }

    #[test]
    fn null_and_empty_snapshots_are_absent() {
        assert_eq!(parse_snapshot(None).unwrap(), None);
        assert_eq!(parse_snapshot(Some(&Value::Null)).unwrap(), None);
        assert_eq!(parse_snapshot(Some(&serde_json::json!({}))).unwrap(), None);
    }

    #[test]
    fn partial_snapshot_defaults_missing_keys() {
        let json = serde_json::json!({"report_count": 2});
        let snapshot = parse_snapshot(Some(&json)).unwrap().expect("present");
        assert_eq!(snapshot.report_count, 2);
        assert!(snapshot.categories.is_empty());
    }

    #[test]
    fn malformed_snapshot_is_an_error() {
        assert!(parse_snapshot(Some(&serde_json::json!("oops"))).is_err());
        assert!(parse_snapshot(Some(&serde_json::json!({"report_count": "many"}))).is_err());
    }

    #[test]
    fn statistics_serialize_with_source_tag() {
        let stats = Statistics::Cached(StatisticsSnapshot::default());
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["source"], "cached");
        assert_eq!(json["statistics"]["report_count"], 0);
        assert!(stats.is_cached());
    }
}
