//! Retraining job state machine

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reason recorded when a pending job is cancelled
pub const CANCELLED_REASON: &str = "cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Training,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Training => "TRAINING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Pending -> Training -> {Succeeded, Failed}; Pending -> Failed
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Training)
                | (JobState::Pending, JobState::Failed)
                | (JobState::Training, JobState::Succeeded)
                | (JobState::Training, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retraining run for a model slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainingJob {
    pub id: String,
    pub target_slot: String,
    /// Set once the dataset has been staged
    pub dataset_uri: Option<String>,
    /// History records left out of the dataset because they could not be prepared
    #[serde(default)]
    pub skipped_records: usize,
    pub state: JobState,
    pub failure: Option<String>,
    /// Training attempts made against the backend
    pub attempts: u32,
    pub model_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RetrainingJob {
    pub fn new(target_slot: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            target_slot: target_slot.into(),
            dataset_uri: None,
            skipped_records: 0,
            state: JobState::Pending,
            failure: None,
            attempts: 0,
            model_version: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn transition(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn start_training(&mut self) -> Result<()> {
        self.transition(JobState::Training)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn succeed(&mut self, model_version: impl Into<String>) -> Result<()> {
        self.transition(JobState::Succeeded)?;
        self.model_version = Some(model_version.into());
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(JobState::Failed)?;
        self.failure = Some(reason.into());
        Ok(())
    }

    /// Cancel a job that has not started training
    pub fn cancel(&mut self) -> Result<()> {
        if self.state != JobState::Pending {
            return Err(EngineError::InvalidTransition {
                from: self.state.to_string(),
                to: format!("{} ({})", JobState::Failed, CANCELLED_REASON),
            });
        }
        self.fail(CANCELLED_REASON)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == JobState::Failed && self.failure.as_deref() == Some(CANCELLED_REASON)
    }
}
