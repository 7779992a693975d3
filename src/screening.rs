//! Call screening: metadata rules plus transcript analysis, combined into
//! one alert per call

use crate::config::AppConfig;
use crate::error::Result;
use crate::models::aggregator::{verdict_score, ScoreAggregator, CALL_METADATA, TRANSCRIPT};
use crate::spam::metadata::{CallMetadataEvaluator, InMemoryCallLog, RULE_COUNT};
use crate::spam::transcript::{SentimentDetector, TranscriptAnalyzer, TranscriptVerdict};
use crate::types::alert::{FraudAlert, RiskLevel, RiskLevelThresholds, SpamVerdict};
use crate::types::call::{CallEvent, CallRecord};
use chrono::{Duration, Local};
use std::collections::HashMap;
use std::sync::Arc;

/// Rules checked by the transcript analyzer
const TRANSCRIPT_RULES: usize = 2;

/// An aggregate below the strongest signal times this factor is raised to it
const SIGNAL_FLOOR: f64 = 0.9;

/// Signal score for a rule verdict: 0 when clean, 0.5 to 1 by share of
/// rules fired otherwise
pub fn spam_signal_score(verdict: &SpamVerdict, total_rules: usize) -> f64 {
    if !verdict.is_spam {
        return 0.0;
    }
    0.5 + 0.5 * verdict_score(verdict.reasons.len(), total_rules)
}

/// Outcome of screening one call
#[derive(Debug, Clone)]
pub struct CallAssessment {
    pub metadata: SpamVerdict,
    pub transcript: Option<TranscriptVerdict>,
    pub alert: FraudAlert,
}

impl CallAssessment {
    pub fn is_spam(&self) -> bool {
        self.metadata.is_spam
            || self
                .transcript
                .as_ref()
                .map(|t| t.verdict.is_spam)
                .unwrap_or(false)
    }
}

pub struct CallScreener {
    evaluator: CallMetadataEvaluator,
    transcripts: TranscriptAnalyzer,
    aggregator: ScoreAggregator,
    thresholds: RiskLevelThresholds,
    call_log: Arc<InMemoryCallLog>,
    window: Duration,
}

impl CallScreener {
    pub fn new(config: &AppConfig, call_log: Arc<InMemoryCallLog>) -> Self {
        Self {
            evaluator: CallMetadataEvaluator::new(&config.call_rules, call_log.clone()),
            transcripts: TranscriptAnalyzer::new(&config.transcript),
            aggregator: ScoreAggregator::default(),
            thresholds: config.detection.risk_levels.clone(),
            call_log,
            window: Duration::seconds(config.call_rules.window_secs),
        }
    }

    pub fn with_sentiment(mut self, detector: Arc<dyn SentimentDetector>) -> Self {
        self.transcripts = self.transcripts.with_detector(detector);
        self
    }

    /// Evaluate a call, then add it to the call log
    pub async fn screen(&self, event: &CallEvent) -> Result<CallAssessment> {
        let call = &event.metadata;
        let call_time = self.evaluator.parse_timestamp(&call.call_timestamp)?;
        let metadata = self.evaluator.evaluate(call)?;

        let transcript = match event.transcript.as_deref() {
            Some(text) if !text.trim().is_empty() => Some(self.transcripts.analyze(text).await?),
            _ => None,
        };

        let now = Local::now().naive_local();
        if let Some(mark) = self.call_log.advance_high_water(call_time, now) {
            self.call_log.prune_before(mark - self.window);
        }
        self.call_log.record(CallRecord {
            caller_id: call.caller_id.clone(),
            timestamp: call_time,
        });

        let mut signal_scores = HashMap::new();
        signal_scores.insert(
            CALL_METADATA.to_string(),
            spam_signal_score(&metadata, RULE_COUNT),
        );
        let mut reasons = metadata.reasons.clone();
        if let Some(t) = &transcript {
            signal_scores.insert(
                TRANSCRIPT.to_string(),
                spam_signal_score(&t.verdict, TRANSCRIPT_RULES),
            );
            reasons.extend(t.verdict.reasons.iter().cloned());
        }

        let risk_score = self
            .aggregator
            .aggregate_with_floor(&signal_scores, SIGNAL_FLOOR);
        let alert = FraudAlert::new(
            call.caller_id.clone(),
            risk_score,
            RiskLevel::from_score(risk_score, &self.thresholds),
            signal_scores,
        )
        .with_user(call.receiver_id.clone())
        .with_reasons(reasons);

        Ok(CallAssessment {
            metadata,
            transcript,
            alert,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::spam::metadata::REASON_BLACKLISTED;
    use crate::spam::transcript::REASON_PHISHING;
    use crate::types::call::CallMetadata;

    fn event(caller: &str, duration: u64, at: &str, transcript: Option<&str>) -> CallEvent {
        CallEvent {
            metadata: CallMetadata::new(caller, "+1987654321", duration, at),
            transcript: transcript.map(str::to_string),
        }
    }

    fn screener() -> (CallScreener, Arc<InMemoryCallLog>) {
        let log = Arc::new(InMemoryCallLog::new());
        (CallScreener::new(&AppConfig::default(), log.clone()), log)
    }

    #[test]
    fn test_signal_score_mapping() {
        let mut verdict = SpamVerdict::clean();
        assert_eq!(spam_signal_score(&verdict, 3), 0.0);
        verdict.flag("a");
        assert!((spam_signal_score(&verdict, 3) - (0.5 + 0.5 / 3.0)).abs() < 1e-12);
        verdict.flag("b");
        verdict.flag("c");
        assert_eq!(spam_signal_score(&verdict, 3), 1.0);
    }

    #[tokio::test]
    async fn test_clean_call() {
        let (screener, log) = screener();
        let assessment = screener
            .screen(&event("+15550001", 300, "2025-01-20 10:15:00", None))
            .await
            .unwrap();

        assert!(!assessment.is_spam());
        assert_eq!(assessment.alert.risk_level, RiskLevel::Low);
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_blacklisted_caller_with_phishing_transcript() {
        let (screener, _) = screener();
        let assessment = screener
            .screen(&event(
                "+1234567890",
                120,
                "2025-01-20 10:15:00",
                Some("This is about your prize money, click the link"),
            ))
            .await
            .unwrap();

        assert!(assessment.is_spam());
        assert_eq!(assessment.alert.reasons, vec![REASON_BLACKLISTED, REASON_PHISHING]);
        assert_eq!(assessment.alert.subject_id, "+1234567890");
        assert!(assessment.alert.risk_level != RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_repeated_calls_trip_frequency_rule() {
        let (screener, _) = screener();
        for minute in 0..5 {
            let at = format!("2025-01-20 10:{:02}:00", minute * 10);
            let a = screener.screen(&event("+15550002", 60, &at, None)).await.unwrap();
            assert!(!a.is_spam());
        }
        let sixth = screener
            .screen(&event("+15550002", 60, "2025-01-20 10:55:00", None))
            .await
            .unwrap();
        assert!(sixth.is_spam());
    }

    #[tokio::test]
    async fn test_future_dated_call_keeps_other_callers_history() {
        let (screener, log) = screener();
        for minute in 0..5 {
            let at = format!("2025-01-20 10:{:02}:00", minute * 10);
            screener.screen(&event("+15550002", 60, &at, None)).await.unwrap();
        }

        screener
            .screen(&event("+15550009", 60, "2999-01-01 00:00:00", None))
            .await
            .unwrap();
        assert_eq!(log.len(), 6);

        let sixth = screener
            .screen(&event("+15550002", 60, "2025-01-20 10:55:00", None))
            .await
            .unwrap();
        assert!(sixth.is_spam());
    }

    #[tokio::test]
    async fn test_log_is_pruned_behind_newest_call() {
        let (screener, log) = screener();
        screener
            .screen(&event("+15550004", 60, "2025-01-20 08:00:00", None))
            .await
            .unwrap();
        screener
            .screen(&event("+15550005", 60, "2025-01-20 10:00:00", None))
            .await
            .unwrap();
        screener
            .screen(&event("+15550004", 60, "2025-01-20 10:30:00", None))
            .await
            .unwrap();
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_timestamp_is_not_logged() {
        let (screener, log) = screener();
        let err = screener
            .screen(&event("+15550003", 60, "yesterday", None))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedTimestamp { .. }));
        assert!(log.is_empty());
    }
}
