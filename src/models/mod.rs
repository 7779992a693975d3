//! Anomaly model, live model slot, artifact loading and score aggregation

pub mod aggregator;
pub mod anomaly;
pub mod inference;
pub mod isolation_forest;
pub mod live;
pub mod loader;

pub use aggregator::ScoreAggregator;
pub use anomaly::{AnomalyModel, AnomalyScore, ModelParams, TrainedModel};
pub use inference::{InferenceEngine, PredictionResult};
pub use live::LiveModel;
pub use loader::{ModelArtifact, ModelLoader};
