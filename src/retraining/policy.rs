//! When to retrain

use crate::config::RetrainingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReason {
    /// At least K feedback entries arrived since the last successful retrain
    NewFeedback(usize),
    IntervalElapsed,
    Forced,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::NewFeedback(n) => write!(f, "{} new feedback entries", n),
            TriggerReason::IntervalElapsed => f.write_str("retraining interval elapsed"),
            TriggerReason::Forced => f.write_str("forced"),
        }
    }
}

/// Retrain after K new feedback entries or a fixed interval, whichever
/// comes first. `min_new_feedback == 0` disables the feedback trigger.
/// Neither trigger fires within `failure_backoff` of a failed job.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrainPolicy {
    pub min_new_feedback: usize,
    pub interval: Duration,
    pub failure_backoff: Duration,
}

impl From<&RetrainingConfig> for RetrainPolicy {
    fn from(config: &RetrainingConfig) -> Self {
        Self {
            min_new_feedback: config.min_new_feedback,
            interval: config.interval(),
            failure_backoff: config.failure_backoff(),
        }
    }
}

impl RetrainPolicy {
    pub fn evaluate(
        &self,
        new_feedback: usize,
        last_retrain: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<TriggerReason> {
        if self.min_new_feedback > 0 && new_feedback >= self.min_new_feedback {
            return Some(TriggerReason::NewFeedback(new_feedback));
        }

        let elapsed = (now - last_retrain).to_std().unwrap_or(Duration::ZERO);
        if elapsed >= self.interval {
            return Some(TriggerReason::IntervalElapsed);
        }

        None
    }

    /// Whether a failure at `last_failure` still holds the triggers back
    pub fn backing_off(&self, last_failure: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last_failure.map_or(false, |failed_at| {
            (now - failed_at).to_std().unwrap_or(Duration::ZERO) < self.failure_backoff
        })
    }
}
