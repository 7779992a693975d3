//! Score aggregation across independent signal detectors

use std::collections::HashMap;

/// Signal produced by the call-metadata rules
pub const CALL_METADATA: &str = "call_metadata";
/// Signal produced by transcript keyword/sentiment analysis
pub const TRANSCRIPT: &str = "transcript";
/// Signal produced by the transaction anomaly model
pub const TRANSACTION_ANOMALY: &str = "transaction_anomaly";
/// Signal produced by the media deepfake service
pub const DEEPFAKE: &str = "deepfake";

/// Aggregates per-signal scores into a single risk score.
pub struct ScoreAggregator {
    /// Signal weights for weighted average
    weights: HashMap<String, f64>,
    /// Default weight for signals not in the weights map
    default_weight: f64,
}

impl ScoreAggregator {
    /// Create a new score aggregator with signal weights.
    pub fn new(weights: HashMap<String, f64>) -> Self {
        Self {
            weights,
            default_weight: 0.1,
        }
    }

    /// Aggregate signal scores into a single risk score.
    ///
    /// Uses weighted average where weights are normalized to sum to 1.
    pub fn aggregate(&self, signal_scores: &HashMap<String, f64>) -> f64 {
        if signal_scores.is_empty() {
            return 0.5; // Neutral score when no signals
        }

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for (signal, &score) in signal_scores {
            let weight = self.weight(signal);
            weighted_sum += score * weight;
            total_weight += weight;
        }

        if total_weight > 0.0 {
            (weighted_sum / total_weight).clamp(0.0, 1.0)
        } else {
            0.5
        }
    }

    /// Aggregate, but never below the strongest single signal's score scaled
    /// by `floor_factor`.
    pub fn aggregate_with_floor(&self, signal_scores: &HashMap<String, f64>, floor_factor: f64) -> f64 {
        let averaged = self.aggregate(signal_scores);
        let floor = Self::max_score(signal_scores) * floor_factor;
        averaged.max(floor).clamp(0.0, 1.0)
    }

    /// Get the maximum score among all signals.
    pub fn max_score(signal_scores: &HashMap<String, f64>) -> f64 {
        signal_scores.values().copied().fold(0.0, f64::max)
    }

    fn weight(&self, signal: &str) -> f64 {
        self.weights
            .get(signal)
            .copied()
            .unwrap_or(self.default_weight)
    }
}

impl Default for ScoreAggregator {
    fn default() -> Self {
        let mut weights = HashMap::new();
        weights.insert(CALL_METADATA.to_string(), 0.30);
        weights.insert(TRANSCRIPT.to_string(), 0.25);
        weights.insert(TRANSACTION_ANOMALY.to_string(), 0.30);
        weights.insert(DEEPFAKE.to_string(), 0.15);

        Self {
            weights,
            default_weight: 0.1,
        }
    }
}

/// Map a rule verdict onto a signal score: share of rules that fired
pub fn verdict_score(triggered: usize, total_rules: usize) -> f64 {
    if total_rules == 0 {
        return 0.0;
    }
    (triggered as f64 / total_rules as f64).clamp(0.0, 1.0)
}
