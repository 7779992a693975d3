//! Transaction scoring against the live anomaly model

use crate::error::{EngineError, Result};
use crate::feature_extractor::FeaturePreparer;
use crate::models::aggregator::TRANSACTION_ANOMALY;
use crate::models::anomaly::AnomalyScore;
use crate::models::live::LiveModel;
use crate::types::alert::{FraudAlert, RiskLevel, RiskLevelThresholds};
use crate::types::transaction::TransactionRecord;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Result of scoring one transaction
#[derive(Debug, Clone)]
pub struct PredictionResult {
    pub transaction_id: String,
    pub anomaly: AnomalyScore,
    /// Version of the model that produced the score
    pub model_version: String,
}

impl PredictionResult {
    /// Convert prediction result to a fraud alert
    pub fn to_alert(
        &self,
        transaction: &TransactionRecord,
        risk_thresholds: &RiskLevelThresholds,
    ) -> FraudAlert {
        let risk_level = RiskLevel::from_score(self.anomaly.score, risk_thresholds);

        let mut signal_scores = HashMap::new();
        signal_scores.insert(TRANSACTION_ANOMALY.to_string(), self.anomaly.score);

        let reasons = if self.anomaly.is_outlier {
            vec!["Transaction flagged as anomalous.".to_string()]
        } else {
            Vec::new()
        };

        FraudAlert::new(
            transaction.transaction_id.clone(),
            self.anomaly.score,
            risk_level,
            signal_scores,
        )
        .with_user(transaction.user_id.clone())
        .with_reasons(reasons)
        .with_model_version(self.model_version.clone())
    }
}

/// Scores transactions with whichever model is live at call time
pub struct InferenceEngine {
    preparer: FeaturePreparer,
    live: Arc<LiveModel>,
}

impl InferenceEngine {
    pub fn new(preparer: FeaturePreparer, live: Arc<LiveModel>) -> Self {
        Self { preparer, live }
    }

    pub fn is_ready(&self) -> bool {
        self.live.current().is_some()
    }

    /// Check that every feature column can be read, with or without a live model
    pub fn validate(&self, transaction: &TransactionRecord) -> Result<()> {
        self.preparer.prepare_one(&transaction.to_record()).map(|_| ())
    }

    /// Score one transaction
    pub fn predict(&self, transaction: &TransactionRecord) -> Result<PredictionResult> {
        let model = self.live.current().ok_or(EngineError::ModelNotReady)?;
        let features = self.preparer.prepare_one(&transaction.to_record())?;
        let anomaly = model.score_one(&features)?;

        debug!(
            transaction_id = %transaction.transaction_id,
            score = anomaly.score,
            outlier = anomaly.is_outlier,
            model_version = %model.version(),
            "Transaction scored"
        );

        Ok(PredictionResult {
            transaction_id: transaction.transaction_id.clone(),
            anomaly,
            model_version: model.version().to_string(),
        })
    }

    /// Score a batch against one model snapshot
    pub fn predict_batch(&self, transactions: &[TransactionRecord]) -> Result<Vec<PredictionResult>> {
        let model = self.live.current().ok_or(EngineError::ModelNotReady)?;
        let records: Vec<_> = transactions.iter().map(|t| t.to_record()).collect();
        let matrix = self.preparer.prepare(&records)?;
        let scores = model.score_matrix(&matrix)?;

        Ok(transactions
            .iter()
            .zip(scores)
            .map(|(tx, anomaly)| PredictionResult {
                transaction_id: tx.transaction_id.clone(),
                anomaly,
                model_version: model.version().to_string(),
            })
            .collect())
    }
}
