//! Transcript analysis: phishing keyword matching plus optional sentiment

use crate::config::TranscriptConfig;
use crate::error::{ExternalError, Result};
use crate::types::alert::SpamVerdict;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const REASON_PHISHING: &str = "Phishing keywords detected.";
pub const REASON_NEGATIVE_SENTIMENT: &str = "Negative sentiment detected.";

/// Sentiment label returned by the NLP service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Mixed,
}

/// External sentiment detection service
#[async_trait]
pub trait SentimentDetector: Send + Sync {
    async fn detect(&self, text: &str) -> std::result::Result<Sentiment, ExternalError>;
}

/// Result of analyzing one transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptVerdict {
    #[serde(flatten)]
    pub verdict: SpamVerdict,
    /// Matched keywords in configured order
    pub detected_keywords: Vec<String>,
    pub sentiment: Option<Sentiment>,
}

pub struct TranscriptAnalyzer {
    keywords: Vec<String>,
    flag_negative_sentiment: bool,
    detector: Option<Arc<dyn SentimentDetector>>,
}

impl TranscriptAnalyzer {
    pub fn new(config: &TranscriptConfig) -> Self {
        Self {
            keywords: config
                .phishing_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            flag_negative_sentiment: config.flag_negative_sentiment,
            detector: None,
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn SentimentDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Keywords contained in `text`, case-insensitive
    pub fn match_keywords(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.keywords
            .iter()
            .filter(|k| !k.is_empty() && lowered.contains(k.as_str()))
            .cloned()
            .collect()
    }

    pub async fn analyze(&self, text: &str) -> Result<TranscriptVerdict> {
        let mut verdict = SpamVerdict::clean();

        let detected_keywords = self.match_keywords(text);
        if !detected_keywords.is_empty() {
            verdict.flag(REASON_PHISHING);
        }

        let sentiment = match &self.detector {
            Some(detector) => Some(detector.detect(text).await?),
            None => None,
        };
        if self.flag_negative_sentiment && sentiment == Some(Sentiment::Negative) {
            verdict.flag(REASON_NEGATIVE_SENTIMENT);
        }

        debug!(
            is_spam = verdict.is_spam,
            keywords = ?detected_keywords,
            sentiment = ?sentiment,
            "Transcript analyzed"
        );

        Ok(TranscriptVerdict {
            verdict,
            detected_keywords,
            sentiment,
        })
    }
}
