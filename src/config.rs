//! Configuration management for the decision and retraining engine

use crate::types::alert::RiskLevelThresholds;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub call_rules: CallRulesConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub retraining: RetrainingConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming transactions
    pub transaction_subject: String,
    /// Subject for incoming call events
    pub call_subject: String,
    /// Subject for incoming user feedback
    pub feedback_subject: String,
    /// Subject for outgoing fraud alerts
    pub alert_subject: String,
    /// Subject for outgoing human notifications
    pub notification_subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            transaction_subject: "transactions".to_string(),
            call_subject: "calls".to_string(),
            feedback_subject: "feedback".to_string(),
            alert_subject: "fraud.alerts".to_string(),
            notification_subject: "fraud.notifications".to_string(),
        }
    }
}

/// Feature columns fed to the anomaly model, in order
#[derive(Debug, Clone, Deserialize)]
pub struct FeaturesConfig {
    pub columns: Vec<String>,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            columns: vec![
                "amount".to_string(),
                "merchant_score".to_string(),
                "user_activity_score".to_string(),
            ],
        }
    }
}

/// Anomaly model hyperparameters
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Number of isolation trees
    #[serde(default = "default_estimators")]
    pub n_estimators: usize,
    /// Sub-sample size per tree (capped at the dataset size)
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    /// Expected fraction of outliers in the training set
    #[serde(default = "default_contamination")]
    pub contamination: f64,
    /// Seed for reproducible training
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Minimum number of training rows
    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,
    /// Optional JSON file of transaction records used to train the first model
    #[serde(default)]
    pub bootstrap_dataset: Option<String>,
}

fn default_estimators() -> usize {
    100
}

fn default_max_samples() -> usize {
    256
}

fn default_contamination() -> f64 {
    0.05
}

fn default_seed() -> u64 {
    42
}

fn default_min_training_samples() -> usize {
    10
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_estimators(),
            max_samples: default_max_samples(),
            contamination: default_contamination(),
            seed: default_seed(),
            min_training_samples: default_min_training_samples(),
            bootstrap_dataset: None,
        }
    }
}

/// Call-metadata spam rules
#[derive(Debug, Clone, Deserialize)]
pub struct CallRulesConfig {
    /// Known spam caller identifiers
    pub blacklist: Vec<String>,
    /// Calls shorter than this are suspicious
    pub min_duration_secs: u64,
    /// Calls allowed from one caller within the trailing window
    pub max_calls_per_window: usize,
    /// Trailing window length
    pub window_secs: i64,
    /// chrono format of `call_timestamp`
    pub timestamp_format: String,
}

impl Default for CallRulesConfig {
    fn default() -> Self {
        Self {
            blacklist: vec!["+1234567890".to_string(), "+0987654321".to_string()],
            min_duration_secs: 10,
            max_calls_per_window: 5,
            window_secs: 3600,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

/// Transcript keyword and sentiment analysis
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptConfig {
    pub phishing_keywords: Vec<String>,
    /// Flag calls whose transcript sentiment is negative
    pub flag_negative_sentiment: bool,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            phishing_keywords: [
                "urgent payment",
                "verify your details",
                "account blocked",
                "prize money",
                "lottery",
                "sensitive information",
                "click the link",
                "immediate action required",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
            flag_negative_sentiment: true,
        }
    }
}

/// Feedback storage
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackConfig {
    /// JSON-lines file; in-memory storage when unset
    #[serde(default)]
    pub path: Option<String>,
}

/// Retraining policy and orchestration
#[derive(Debug, Clone, Deserialize)]
pub struct RetrainingConfig {
    /// Retrain after this many new feedback entries
    pub min_new_feedback: usize,
    /// Retrain at least this often
    pub interval_secs: u64,
    /// How often the orchestrator checks its trigger policy
    pub check_interval_secs: u64,
    /// Trailing window of transaction history staged for training
    pub history_window_hours: i64,
    /// Deadline for a single training run
    pub training_deadline_secs: u64,
    /// Retries for transient collaborator failures
    pub max_retries: u32,
    /// First retry backoff, doubled on each attempt
    pub initial_backoff_ms: u64,
    /// Local directory for staged datasets
    pub staging_dir: String,
    /// Local directory backing the object storage
    pub storage_dir: String,
    /// Name of the model slot replaced by successful jobs
    pub target_slot: String,
    /// Quiet period after a failed job before the policy may fire again
    #[serde(default = "default_failure_backoff_secs")]
    pub failure_backoff_secs: u64,
}

fn default_failure_backoff_secs() -> u64 {
    300
}

impl Default for RetrainingConfig {
    fn default() -> Self {
        Self {
            min_new_feedback: 50,
            interval_secs: 24 * 3600,
            check_interval_secs: 60,
            history_window_hours: 24 * 30,
            training_deadline_secs: 600,
            max_retries: 3,
            initial_backoff_ms: 500,
            staging_dir: "data/staging".to_string(),
            storage_dir: "data/storage".to_string(),
            target_slot: "transaction-anomaly".to_string(),
            failure_backoff_secs: default_failure_backoff_secs(),
        }
    }
}

impl RetrainingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn training_deadline(&self) -> Duration {
        Duration::from_secs(self.training_deadline_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Aggregated call risk score at or above which an alert is published
    pub threshold: f64,
    /// Risk level classification thresholds
    pub risk_levels: RiskLevelThresholds,
    /// Recipient notified of every transaction alert
    #[serde(default)]
    pub notify_recipient: Option<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            risk_levels: RiskLevelThresholds::default(),
            notify_recipient: None,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum concurrently processed messages per subject
    pub workers: usize,
    /// Metrics summary interval
    pub metrics_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            metrics_interval_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, with `FRAUD_ENGINE__SECTION__KEY`
    /// environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("FRAUD_ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.features.columns.is_empty() {
            anyhow::bail!("features.columns must not be empty");
        }
        if !(self.model.contamination > 0.0 && self.model.contamination <= 0.5) {
            anyhow::bail!(
                "model.contamination must be in (0, 0.5], got {}",
                self.model.contamination
            );
        }
        if self.call_rules.window_secs <= 0 {
            anyhow::bail!("call_rules.window_secs must be positive");
        }
        if self.pipeline.workers == 0 {
            anyhow::bail!("pipeline.workers must be at least 1");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig::default(),
            features: FeaturesConfig::default(),
            model: ModelConfig::default(),
            call_rules: CallRulesConfig::default(),
            transcript: TranscriptConfig::default(),
            feedback: FeedbackConfig::default(),
            retraining: RetrainingConfig::default(),
            detection: DetectionConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.model.contamination, 0.05);
        assert_eq!(config.model.seed, 42);
        assert_eq!(config.call_rules.min_duration_secs, 10);
        assert_eq!(config.call_rules.max_calls_per_window, 5);
        assert_eq!(config.transcript.phishing_keywords.len(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[model]\ncontamination = 0.1\nseed = 7\n\n[call_rules]\nblacklist = [\"+15550000\"]\nmin_duration_secs = 5\nmax_calls_per_window = 3\nwindow_secs = 600\ntimestamp_format = \"%Y-%m-%d %H:%M:%S\""
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.model.contamination, 0.1);
        assert_eq!(config.model.seed, 7);
        assert_eq!(config.model.n_estimators, 100);
        assert_eq!(config.call_rules.blacklist, vec!["+15550000".to_string()]);
        assert_eq!(config.retraining.max_retries, 3);
    }

    #[test]
    fn test_rejects_bad_contamination() {
        let mut config = AppConfig::default();
        config.model.contamination = 0.8;
        assert!(config.validate().is_err());
    }
}
