//! Training backend contract and the in-process implementation

use crate::error::{ExternalError, Result};
use crate::feature_extractor::FeatureMatrix;
use crate::models::anomaly::{AnomalyModel, ModelParams};
use crate::models::loader::ModelArtifact;
use crate::storage::ObjectStorage;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const SERVICE: &str = "training-backend";

/// Opaque "train" operation: dataset reference in, model artifact out
#[async_trait]
pub trait TrainingBackend: Send + Sync {
    async fn train(&self, dataset_uri: &str, params: &ModelParams) -> Result<ModelArtifact>;
}

/// Trains on a blocking worker thread and stores the artifact through the
/// configured object storage
pub struct LocalTrainingBackend {
    storage: Arc<dyn ObjectStorage>,
    work_dir: PathBuf,
}

impl LocalTrainingBackend {
    pub fn new(storage: Arc<dyn ObjectStorage>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait]
impl TrainingBackend for LocalTrainingBackend {
    async fn train(&self, dataset_uri: &str, params: &ModelParams) -> Result<ModelArtifact> {
        let bytes = self.storage.read(dataset_uri).await?;
        let matrix: FeatureMatrix = serde_json::from_slice(&bytes).map_err(|e| {
            ExternalError::fatal(SERVICE, format!("malformed dataset {}: {}", dataset_uri, e))
        })?;

        let params = params.clone();
        let trained = tokio::task::spawn_blocking(move || AnomalyModel::train(&matrix, &params))
            .await
            .map_err(|e| ExternalError::fatal(SERVICE, format!("training task aborted: {}", e)))??;

        let model = trained.model;
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let artifact_path = self.work_dir.join(format!("model-{}.json", model.version()));
        let encoded = serde_json::to_vec(&model)?;
        tokio::fs::write(&artifact_path, encoded).await?;

        let uri = self.storage.upload(&artifact_path).await?;
        info!(
            dataset = %dataset_uri,
            artifact = %uri,
            version = %model.version(),
            samples = model.training_samples(),
            "Model trained"
        );

        Ok(ModelArtifact { uri })
    }
}
