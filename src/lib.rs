//! Fraud Signal Engine
//!
//! Combines call-metadata rules, transcript analysis, transaction anomaly
//! scoring and deepfake scoring into fraud verdicts, and retrains the
//! anomaly model as user feedback arrives.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_extractor;
pub mod feedback;
pub mod media;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod retraining;
pub mod screening;
pub mod spam;
pub mod storage;
pub mod types;

pub use config::AppConfig;
pub use consumer::SignalConsumer;
pub use error::{EngineError, ExternalError, Result};
pub use feature_extractor::{FeatureMatrix, FeaturePreparer, FeatureScaler};
pub use feedback::FeedbackStore;
pub use models::{AnomalyModel, InferenceEngine, LiveModel};
pub use producer::{AlertProducer, Notifier};
pub use retraining::{RetrainingJob, RetrainingOrchestrator};
pub use screening::CallScreener;
pub use spam::{CallMetadataEvaluator, TranscriptAnalyzer};
pub use types::{FraudAlert, TransactionRecord};
