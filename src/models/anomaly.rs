//! Trained anomaly model: feature layout, fitted scaling, forest and threshold.

use crate::config::ModelConfig;
use crate::error::{EngineError, Result};
use crate::feature_extractor::{FeatureMatrix, FeatureScaler, FeatureVector, ScaledVector};
use crate::models::isolation_forest::{quantile, ForestParams, IsolationForest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Training hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub forest: ForestParams,
    /// Expected fraction of outliers, in (0, 0.5]
    pub contamination: f64,
    pub min_training_samples: usize,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            forest: ForestParams::default(),
            contamination: 0.05,
            min_training_samples: 10,
        }
    }
}

impl From<&ModelConfig> for ModelParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            forest: ForestParams {
                n_estimators: config.n_estimators,
                max_samples: config.max_samples,
                seed: config.seed,
            },
            contamination: config.contamination,
            min_training_samples: config.min_training_samples,
        }
    }
}

/// Score and label for one vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScore {
    /// In (0, 1]; higher is more anomalous
    pub score: f64,
    pub is_outlier: bool,
}

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: AnomalyModel,
    /// Outlier label of each training row, in input order
    pub training_labels: Vec<bool>,
}

impl TrainedModel {
    pub fn outlier_count(&self) -> usize {
        self.training_labels.iter().filter(|&&o| o).count()
    }
}

/// Immutable once trained; safe to share across scoring tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyModel {
    version: String,
    feature_names: Vec<String>,
    scaler: FeatureScaler,
    forest: IsolationForest,
    threshold: f64,
    contamination: f64,
    training_samples: usize,
    trained_at: DateTime<Utc>,
}

impl AnomalyModel {
    /// Fit scaling, forest and decision threshold on raw training vectors
    pub fn train(matrix: &FeatureMatrix, params: &ModelParams) -> Result<TrainedModel> {
        if !(params.contamination > 0.0 && params.contamination <= 0.5) {
            return Err(EngineError::Validation(format!(
                "contamination must be in (0, 0.5], got {}",
                params.contamination
            )));
        }
        let required = params.min_training_samples.max(2);
        if matrix.len() < required {
            return Err(EngineError::InsufficientData {
                required,
                actual: matrix.len(),
            });
        }
        if matrix.dimension() == 0 {
            return Err(EngineError::Validation(
                "at least one feature column is required".to_string(),
            ));
        }

        let scaler = FeatureScaler::fit(matrix)?;
        let scaled = matrix
            .rows
            .iter()
            .map(|row| scaler.transform(row))
            .collect::<Result<Vec<_>>>()?;

        let forest = IsolationForest::fit(&scaled, &params.forest)?;
        let training_scores = scaled
            .iter()
            .map(|row| forest.score(row))
            .collect::<Result<Vec<_>>>()?;
        let threshold = quantile(&training_scores, 1.0 - params.contamination);
        let training_labels: Vec<bool> = training_scores.iter().map(|&s| s > threshold).collect();

        let model = Self {
            version: uuid::Uuid::new_v4().to_string(),
            feature_names: matrix.columns.clone(),
            scaler,
            forest,
            threshold,
            contamination: params.contamination,
            training_samples: matrix.len(),
            trained_at: Utc::now(),
        };

        info!(
            version = %model.version,
            samples = matrix.len(),
            features = matrix.dimension(),
            threshold = threshold,
            outliers = training_labels.iter().filter(|&&o| o).count(),
            "Anomaly model trained"
        );

        Ok(TrainedModel {
            model,
            training_labels,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn dimension(&self) -> usize {
        self.feature_names.len()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    pub fn training_samples(&self) -> usize {
        self.training_samples
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn scaler(&self) -> &FeatureScaler {
        &self.scaler
    }

    /// Score raw vectors laid out in the model's feature order
    pub fn score(&self, vectors: &[FeatureVector]) -> Result<Vec<AnomalyScore>> {
        vectors
            .iter()
            .map(|raw| {
                if raw.len() != self.dimension() {
                    return Err(EngineError::DimensionMismatch {
                        expected: self.dimension(),
                        actual: raw.len(),
                    });
                }
                let scaled = self.scaler.transform(raw)?;
                self.score_standardized(&scaled)
            })
            .collect()
    }

    /// Score one raw vector
    pub fn score_one(&self, vector: &[f64]) -> Result<AnomalyScore> {
        let scaled = self.scaler.transform(vector)?;
        self.score_standardized(&scaled)
    }

    /// Score a matrix after checking its column layout against the model
    pub fn score_matrix(&self, matrix: &FeatureMatrix) -> Result<Vec<AnomalyScore>> {
        if matrix.columns != self.feature_names {
            if matrix.dimension() != self.dimension() {
                return Err(EngineError::DimensionMismatch {
                    expected: self.dimension(),
                    actual: matrix.dimension(),
                });
            }
            return Err(EngineError::FeatureLayoutMismatch {
                expected: self.feature_names.clone(),
                actual: matrix.columns.clone(),
            });
        }
        self.score(&matrix.rows)
    }

    /// Score vectors that were standardized ahead of time.
    ///
    /// Vectors produced by any scaler other than this model's are rejected.
    pub fn score_scaled(&self, vectors: &[ScaledVector]) -> Result<Vec<AnomalyScore>> {
        let expected = self.scaler.fingerprint();
        vectors
            .iter()
            .map(|v| {
                if v.scaler_fingerprint != expected {
                    return Err(EngineError::ScalingMismatch {
                        expected,
                        actual: v.scaler_fingerprint,
                    });
                }
                if v.values.len() != self.dimension() {
                    return Err(EngineError::DimensionMismatch {
                        expected: self.dimension(),
                        actual: v.values.len(),
                    });
                }
                self.score_standardized(&v.values)
            })
            .collect()
    }

    fn score_standardized(&self, scaled: &[f64]) -> Result<AnomalyScore> {
        let score = self.forest.score(scaled)?;
        Ok(AnomalyScore {
            score,
            is_outlier: score > self.threshold,
        })
    }
}
