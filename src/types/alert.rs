//! Verdict and alert data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Risk level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Determine risk level from score and thresholds
    pub fn from_score(score: f64, thresholds: &RiskLevelThresholds) -> Self {
        if score >= thresholds.critical {
            RiskLevel::Critical
        } else if score >= thresholds.high {
            RiskLevel::High
        } else if score >= thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Configurable risk level thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLevelThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskLevelThresholds {
    fn default() -> Self {
        Self {
            low: 0.3,
            medium: 0.5,
            high: 0.7,
            critical: 0.9,
        }
    }
}

/// Outcome of a rule-based spam check.
///
/// Reasons keep rule evaluation order; repeated reasons are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpamVerdict {
    pub is_spam: bool,
    pub reasons: Vec<String>,
}

impl SpamVerdict {
    pub fn clean() -> Self {
        Self::default()
    }

    /// Record a triggered rule
    pub fn flag(&mut self, reason: impl Into<String>) {
        self.is_spam = true;
        self.reasons.push(reason.into());
    }

    /// Append another verdict's reasons after this one's
    pub fn merge(&mut self, other: &SpamVerdict) {
        self.is_spam |= other.is_spam;
        self.reasons.extend(other.reasons.iter().cloned());
    }
}

/// Alert generated when combined signals exceed the risk threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAlert {
    /// Unique alert identifier
    pub alert_id: String,

    /// Transaction ID or caller ID the alert is about
    pub subject_id: String,

    /// Combined risk score (0.0 - 1.0)
    pub risk_score: f64,

    /// Risk level classification
    pub risk_level: RiskLevel,

    /// Individual signal scores
    pub signal_scores: HashMap<String, f64>,

    /// Human-readable reasons from the detectors
    pub reasons: Vec<String>,

    /// Alert generation timestamp
    pub timestamp: DateTime<Utc>,

    /// Account holder, when known
    pub user_id: Option<String>,

    /// Version of the anomaly model that contributed, if any
    pub model_version: Option<String>,
}

impl FraudAlert {
    /// Create a new fraud alert
    pub fn new(
        subject_id: String,
        risk_score: f64,
        risk_level: RiskLevel,
        signal_scores: HashMap<String, f64>,
    ) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            subject_id,
            risk_score,
            risk_level,
            signal_scores,
            reasons: Vec::new(),
            timestamp: Utc::now(),
            user_id: None,
            model_version: None,
        }
    }

    pub fn with_reasons(mut self, reasons: Vec<String>) -> Self {
        self.reasons = reasons;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }
}
