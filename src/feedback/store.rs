//! Validated, serialized feedback ingestion

use crate::error::{EngineError, Result};
use crate::feedback::storage::FeedbackStorage;
use crate::types::feedback::{FeedbackEntry, FeedbackSummary, MAX_RATING, MIN_RATING};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Append-only feedback repository.
///
/// Appends go through a single writer lock so `created_at` never goes
/// backwards in insertion order. Reads do not take the lock.
pub struct FeedbackStore {
    storage: Box<dyn FeedbackStorage>,
    last_created_at: Mutex<Option<DateTime<Utc>>>,
}

impl FeedbackStore {
    pub fn new(storage: Box<dyn FeedbackStorage>) -> Self {
        Self {
            storage,
            last_created_at: Mutex::new(None),
        }
    }

    /// Validate and append one entry
    pub fn collect(&self, user_id: &str, comment: &str, rating: i64) -> Result<FeedbackEntry> {
        let (user_id, comment, rating) = Self::validate(user_id, comment, rating)?;

        let mut last = self
            .last_created_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let now = Utc::now();
        let created_at = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };

        let entry = FeedbackEntry {
            user_id,
            comment,
            rating,
            created_at,
        };
        self.storage.append(&entry)?;
        *last = Some(created_at);
        drop(last);

        info!(user_id = %entry.user_id, rating = entry.rating, "Feedback collected");
        Ok(entry)
    }

    fn validate(user_id: &str, comment: &str, rating: i64) -> Result<(String, String, u8)> {
        if !(MIN_RATING as i64..=MAX_RATING as i64).contains(&rating) {
            return Err(EngineError::Validation(format!(
                "Rating must be between {} and {}, got {}",
                MIN_RATING, MAX_RATING, rating
            )));
        }

        let comment = comment.trim();
        if comment.is_empty() {
            return Err(EngineError::Validation("Feedback text cannot be empty".to_string()));
        }

        Ok((user_id.to_string(), comment.to_string(), rating as u8))
    }

    /// Every stored entry in insertion order
    pub fn entries(&self) -> Result<Vec<FeedbackEntry>> {
        self.storage.all()
    }

    pub fn summary(&self) -> Result<FeedbackSummary> {
        let entries = self.storage.all()?;
        let summary = FeedbackSummary::from_entries(&entries);
        debug!(count = summary.count, mean = summary.mean_rating, "Feedback summary computed");
        Ok(summary)
    }

    pub fn len(&self) -> Result<usize> {
        self.storage.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
