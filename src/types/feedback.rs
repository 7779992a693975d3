//! User feedback on verdicts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lowest accepted rating
pub const MIN_RATING: u8 = 1;
/// Highest accepted rating
pub const MAX_RATING: u8 = 5;

/// One stored feedback entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub user_id: String,
    pub comment: String,
    pub rating: u8,
    /// Assigned by the store at write time
    pub created_at: DateTime<Utc>,
}

/// Feedback as submitted through the reporting surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSubmission {
    pub user_id: String,
    pub comment: String,
    pub rating: i64,
}

/// Aggregate view over all stored feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub count: usize,
    pub mean_rating: f64,
    /// Count per rating value; always holds the keys 1 through 5
    pub histogram: BTreeMap<u8, usize>,
}

impl FeedbackSummary {
    /// Summary of an empty store
    pub fn empty() -> Self {
        Self {
            count: 0,
            mean_rating: 0.0,
            histogram: (MIN_RATING..=MAX_RATING).map(|r| (r, 0)).collect(),
        }
    }

    /// Compute the summary over a set of entries
    pub fn from_entries(entries: &[FeedbackEntry]) -> Self {
        let mut summary = Self::empty();
        if entries.is_empty() {
            return summary;
        }

        let mut total: u64 = 0;
        for entry in entries {
            total += entry.rating as u64;
            *summary.histogram.entry(entry.rating).or_insert(0) += 1;
        }

        summary.count = entries.len();
        summary.mean_rating = total as f64 / entries.len() as f64;
        summary
    }
}
