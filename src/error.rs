//! Error types for the decision and retraining engine

use thiserror::Error;

/// Whether a collaborator failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient condition (network hiccup, throttling, staging race)
    Retryable,
    /// Will not succeed on retry (malformed dataset, auth failure)
    Fatal,
}

/// Failure reported by an external collaborator (object storage, training
/// backend, NLP or vision service, notification transport)
#[derive(Debug, Clone, Error)]
#[error("{service} failed ({kind:?}): {message}")]
pub struct ExternalError {
    pub service: String,
    pub kind: FailureKind,
    pub message: String,
}

impl ExternalError {
    pub fn retryable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            kind: FailureKind::Retryable,
            message: message.into(),
        }
    }

    pub fn fatal(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            kind: FailureKind::Fatal,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == FailureKind::Retryable
    }
}

/// Engine error taxonomy
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input shape or range
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing column '{column}' in record {record}")]
    MissingColumn { column: String, record: usize },

    #[error("Invalid value for column '{column}' in record {record}: {reason}")]
    InvalidValue {
        column: String,
        record: usize,
        reason: String,
    },

    #[error("Insufficient data: {actual} samples provided, at least {required} required")]
    InsufficientData { required: usize, actual: usize },

    #[error("Dimension mismatch: expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Feature layout mismatch: model trained on {expected:?}, got {actual:?}")]
    FeatureLayoutMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Feature vector was scaled with a different scaler (expected {expected:016x}, got {actual:016x})")]
    ScalingMismatch { expected: u64, actual: u64 },

    #[error("Malformed timestamp '{value}': expected format {format}")]
    MalformedTimestamp { value: String, format: String },

    #[error("No anomaly model is currently in service")]
    ModelNotReady,

    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("No faces detected above confidence {min_confidence}")]
    NoFacesDetected { min_confidence: f64 },

    #[error(transparent)]
    External(#[from] ExternalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Retry policy input: only transient collaborator failures qualify
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::External(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Errors caused by the caller's input rather than the engine state
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::MissingColumn { .. }
                | Self::InvalidValue { .. }
                | Self::InsufficientData { .. }
                | Self::DimensionMismatch { .. }
                | Self::FeatureLayoutMismatch { .. }
                | Self::ScalingMismatch { .. }
                | Self::MalformedTimestamp { .. }
        )
    }
}
