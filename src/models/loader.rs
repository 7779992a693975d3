//! Anomaly model artifact loader

use crate::error::{EngineError, Result};
use crate::models::anomaly::AnomalyModel;
use crate::storage::ObjectStorage;
use std::sync::Arc;
use tracing::info;

/// Reference to a stored model artifact, as returned by a training backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifact {
    pub uri: String,
}

/// Loads serialized anomaly models and checks them against the expected
/// feature layout before they are put into service
pub struct ModelLoader {
    storage: Arc<dyn ObjectStorage>,
    expected_features: Vec<String>,
}

impl ModelLoader {
    pub fn new(storage: Arc<dyn ObjectStorage>, expected_features: Vec<String>) -> Self {
        Self {
            storage,
            expected_features,
        }
    }

    /// Fetch and decode an artifact from object storage
    pub async fn load(&self, artifact: &ModelArtifact) -> Result<AnomalyModel> {
        let bytes = self.storage.read(&artifact.uri).await?;
        let model = self.decode(&bytes)?;

        info!(
            uri = %artifact.uri,
            version = %model.version(),
            samples = model.training_samples(),
            "Model artifact loaded"
        );
        Ok(model)
    }

    fn decode(&self, bytes: &[u8]) -> Result<AnomalyModel> {
        let model: AnomalyModel = serde_json::from_slice(bytes)?;
        if model.feature_names() != self.expected_features.as_slice() {
            return Err(EngineError::FeatureLayoutMismatch {
                expected: self.expected_features.clone(),
                actual: model.feature_names().to_vec(),
            });
        }
        Ok(model)
    }
}
