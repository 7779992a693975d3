//! Feedback-driven retraining loop.
//!
//! Stages the recent transaction history as a dataset, hands it to the
//! training backend, verifies the returned artifact and swaps it into the
//! live model slot. A job that fails at any step leaves the live model as it
//! was.

use crate::config::RetrainingConfig;
use crate::error::{EngineError, Result};
use crate::feature_extractor::FeaturePreparer;
use crate::feedback::FeedbackStore;
use crate::metrics::PipelineMetrics;
use crate::models::anomaly::{AnomalyModel, ModelParams};
use crate::models::live::LiveModel;
use crate::models::loader::{ModelArtifact, ModelLoader};
use crate::retraining::backend::TrainingBackend;
use crate::retraining::job::{JobState, RetrainingJob};
use crate::retraining::policy::{RetrainPolicy, TriggerReason};
use crate::retraining::retry::{retry_with_backoff, RetryPolicy};
use crate::retraining::source::TransactionSource;
use crate::storage::ObjectStorage;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MAX_JOB_HISTORY: usize = 100;

/// Collaborators the orchestrator drives
pub struct RetrainingDeps {
    pub transactions: Arc<dyn TransactionSource>,
    pub storage: Arc<dyn ObjectStorage>,
    pub backend: Arc<dyn TrainingBackend>,
    pub feedback: Arc<FeedbackStore>,
    pub live: Arc<LiveModel>,
}

#[derive(Debug)]
struct OrchestratorState {
    /// Feedback count consumed by the last successful retrain
    feedback_watermark: usize,
    last_retrain: DateTime<Utc>,
    /// End of the most recent failed or cancelled job, cleared on success
    last_failure: Option<DateTime<Utc>>,
    jobs: Vec<RetrainingJob>,
}

pub struct RetrainingOrchestrator {
    policy: RetrainPolicy,
    retry: RetryPolicy,
    params: ModelParams,
    preparer: FeaturePreparer,
    loader: ModelLoader,
    deps: RetrainingDeps,
    target_slot: String,
    staging_dir: PathBuf,
    history_window: chrono::Duration,
    training_deadline: Duration,
    check_interval: Duration,
    state: Mutex<OrchestratorState>,
    /// One job trains at a time
    training_lock: tokio::sync::Mutex<()>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl RetrainingOrchestrator {
    pub fn new(
        config: &RetrainingConfig,
        params: ModelParams,
        preparer: FeaturePreparer,
        deps: RetrainingDeps,
    ) -> Self {
        let loader = ModelLoader::new(deps.storage.clone(), preparer.columns().to_vec());
        Self {
            policy: RetrainPolicy::from(config),
            retry: RetryPolicy::from(config),
            params,
            preparer,
            loader,
            deps,
            target_slot: config.target_slot.clone(),
            staging_dir: PathBuf::from(&config.staging_dir),
            history_window: chrono::Duration::hours(config.history_window_hours),
            training_deadline: config.training_deadline(),
            check_interval: Duration::from_secs(config.check_interval_secs.max(1)),
            state: Mutex::new(OrchestratorState {
                feedback_watermark: 0,
                last_retrain: Utc::now(),
                last_failure: None,
                jobs: Vec::new(),
            }),
            training_lock: tokio::sync::Mutex::new(()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_training_deadline(mut self, deadline: Duration) -> Self {
        self.training_deadline = deadline;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Treat the current feedback as already consumed, e.g. after loading a
    /// bootstrap model trained on the same data
    pub fn mark_feedback_consumed(&self) -> Result<()> {
        let count = self.deps.feedback.len()?;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.feedback_watermark = count;
        state.last_retrain = Utc::now();
        Ok(())
    }

    /// Feedback entries received since the last successful retrain
    pub fn new_feedback_count(&self) -> Result<usize> {
        let total = self.deps.feedback.len()?;
        let watermark = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .feedback_watermark;
        Ok(total.saturating_sub(watermark))
    }

    /// Whether the retrain policy fires now
    pub fn check_trigger(&self) -> Result<Option<TriggerReason>> {
        let now = Utc::now();
        if self.backing_off(now) {
            debug!("Retraining backing off after a failed job");
            return Ok(None);
        }
        let new_feedback = self.new_feedback_count()?;
        let last_retrain = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_retrain;
        Ok(self.policy.evaluate(new_feedback, last_retrain, now))
    }

    fn backing_off(&self, now: DateTime<Utc>) -> bool {
        let last_failure = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_failure;
        self.policy.backing_off(last_failure, now)
    }

    /// Create a pending job. Cancelling the token before training starts
    /// fails the job with a "cancelled" reason.
    pub fn submit(&self) -> (RetrainingJob, CancellationToken) {
        let job = RetrainingJob::new(self.target_slot.clone());
        self.record(&job);
        info!(job_id = %job.id, slot = %job.target_slot, "Retraining job submitted");
        (job, CancellationToken::new())
    }

    /// Drive a submitted job to a terminal state
    pub async fn execute(&self, mut job: RetrainingJob, cancel: CancellationToken) -> RetrainingJob {
        if job.state != JobState::Pending {
            warn!(job_id = %job.id, state = %job.state, "Job is not pending, ignoring");
            return job;
        }

        let _guard = self.training_lock.lock().await;
        let feedback_at_start = match self.deps.feedback.len() {
            Ok(count) => count,
            Err(e) => return self.finish_failed(job, &e),
        };

        let staged = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            staged = self.stage(&job.id) => staged,
        };
        let dataset_uri = match staged {
            Ok((uri, skipped)) => {
                job.skipped_records = skipped;
                uri
            }
            Err(EngineError::Cancelled) => return self.finish_cancelled(job),
            Err(e) => return self.finish_failed(job, &e),
        };
        job.dataset_uri = Some(dataset_uri.clone());

        if cancel.is_cancelled() {
            return self.finish_cancelled(job);
        }
        if let Err(e) = job.start_training() {
            return self.finish_failed(job, &e);
        }
        self.record(&job);
        info!(job_id = %job.id, dataset = %dataset_uri, "Retraining started");

        match self.train_and_load(&mut job, &dataset_uri).await {
            Ok(model) => {
                let version = model.version().to_string();
                if let Err(e) = job.succeed(version.clone()) {
                    return self.finish_failed(job, &e);
                }
                self.deps.live.swap(model);
                {
                    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                    state.feedback_watermark = state.feedback_watermark.max(feedback_at_start);
                    state.last_retrain = Utc::now();
                    state.last_failure = None;
                }
                self.record(&job);
                if let Some(metrics) = &self.metrics {
                    metrics.record_retrain(true);
                }
                info!(
                    job_id = %job.id,
                    version = %version,
                    attempts = job.attempts,
                    "Retraining succeeded"
                );
                job
            }
            Err(e) => self.finish_failed(job, &e),
        }
    }

    /// Check the policy (unless forced) and run one job if it fires
    pub async fn run_once(&self, force: bool) -> Result<Option<RetrainingJob>> {
        let trigger = if force {
            Some(TriggerReason::Forced)
        } else {
            self.check_trigger()?
        };
        let Some(trigger) = trigger else {
            debug!("Retraining not due");
            return Ok(None);
        };

        info!(trigger = %trigger, "Retraining triggered");
        let (job, cancel) = self.submit();
        Ok(Some(self.execute(job, cancel).await))
    }

    /// Periodic policy check until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.check_interval, "Retraining loop started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Retraining loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    // An empty slot is retrained on every check outside a failure backoff
                    let force = self.deps.live.current().is_none() && !self.backing_off(Utc::now());
                    if let Err(e) = self.run_once(force).await {
                        error!(error = %e, "Retraining check failed");
                    }
                }
            }
        }
    }

    /// Job history, oldest first
    pub fn jobs(&self) -> Vec<RetrainingJob> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .jobs
            .clone()
    }

    pub fn job(&self, id: &str) -> Option<RetrainingJob> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned()
    }

    /// Write the training matrix to the staging dir and upload it, returning
    /// the dataset uri and the number of history records left out
    async fn stage(&self, job_id: &str) -> Result<(String, usize)> {
        let since = Utc::now() - self.history_window;
        let source = &self.deps.transactions;
        let fetched = retry_with_backoff(&self.retry, "load-transactions", || async move {
            source
                .transactions_since(since)
                .await
                .map_err(EngineError::from)
        })
        .await;
        let transactions = fetched.result?;

        let records: Vec<_> = transactions.iter().map(|t| t.to_record()).collect();
        let (matrix, rejected) = self.preparer.prepare_valid(&records);
        if let Some(first) = rejected.first() {
            warn!(
                job_id = %job_id,
                skipped = rejected.len(),
                first_error = %first,
                "Unpreparable history records left out of the dataset"
            );
        }
        let required = self.params.min_training_samples.max(2);
        if matrix.len() < required {
            return Err(EngineError::InsufficientData {
                required,
                actual: matrix.len(),
            });
        }

        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let path = self.staging_dir.join(format!("dataset-{}.json", job_id));
        tokio::fs::write(&path, serde_json::to_vec(&matrix)?).await?;

        let storage = &self.deps.storage;
        let staged_path = &path;
        let uploaded = retry_with_backoff(&self.retry, "upload-dataset", || async move {
            storage
                .upload(staged_path)
                .await
                .map_err(EngineError::from)
        })
        .await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), error = %e, "Staging file not removed");
        }
        let uri = uploaded.result?;

        info!(job_id = %job_id, rows = matrix.len(), uri = %uri, "Dataset staged");
        Ok((uri, rejected.len()))
    }

    async fn train_and_load(&self, job: &mut RetrainingJob, dataset_uri: &str) -> Result<AnomalyModel> {
        let backend = &self.deps.backend;
        let params = &self.params;
        let training = retry_with_backoff(&self.retry, "train", || async move {
            backend.train(dataset_uri, params).await
        });

        let outcome = tokio::time::timeout(self.training_deadline, training)
            .await
            .map_err(|_| EngineError::Timeout(self.training_deadline))?;
        job.attempts = outcome.attempts;
        let artifact: ModelArtifact = outcome.result?;

        let loader = &self.loader;
        let artifact_ref = &artifact;
        let loaded = retry_with_backoff(&self.retry, "load-artifact", || async move {
            loader.load(artifact_ref).await
        })
        .await;
        let model = loaded.result?;

        if model.dimension() != self.preparer.feature_count() {
            return Err(EngineError::DimensionMismatch {
                expected: self.preparer.feature_count(),
                actual: model.dimension(),
            });
        }
        Ok(model)
    }

    fn finish_cancelled(&self, mut job: RetrainingJob) -> RetrainingJob {
        if let Err(e) = job.cancel() {
            warn!(job_id = %job.id, error = %e, "Cancel rejected");
        }
        self.note_failure();
        self.record(&job);
        info!(job_id = %job.id, "Retraining job cancelled");
        job
    }

    fn finish_failed(&self, mut job: RetrainingJob, cause: &EngineError) -> RetrainingJob {
        if let Err(e) = job.fail(cause.to_string()) {
            warn!(job_id = %job.id, error = %e, "Could not mark job failed");
        }
        self.note_failure();
        self.record(&job);
        if let Some(metrics) = &self.metrics {
            metrics.record_retrain(false);
        }
        warn!(
            job_id = %job.id,
            error = %cause,
            live_version = self.deps.live.version().as_deref().unwrap_or("none"),
            "Retraining failed, live model unchanged"
        );
        job
    }

    fn note_failure(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_failure = Some(Utc::now());
    }

    fn record(&self, job: &RetrainingJob) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job.clone(),
            None => {
                state.jobs.push(job.clone());
                if state.jobs.len() > MAX_JOB_HISTORY {
                    let excess = state.jobs.len() - MAX_JOB_HISTORY;
                    state.jobs.drain(..excess);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExternalError;
    use crate::feature_extractor::FeatureMatrix;
    use crate::feedback::InMemoryFeedbackStorage;
    use crate::retraining::backend::LocalTrainingBackend;
    use crate::retraining::source::InMemoryTransactionSource;
    use crate::storage::InMemoryObjectStorage;
    use crate::types::transaction::TransactionRecord;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn columns() -> Vec<String> {
        vec!["amount".to_string(), "merchant_score".to_string()]
    }

    fn transactions(n: usize) -> Vec<TransactionRecord> {
        (0..n)
            .map(|i| {
                TransactionRecord::new(format!("T{}", i), 40.0 + (i % 6) as f64 * 15.0, "shop", "U1")
                    .with_attribute("merchant_score", 0.9 - (i % 3) as f64 * 0.1)
            })
            .collect()
    }

    fn initial_model() -> AnomalyModel {
        let rows = (0..20).map(|i| vec![50.0 + i as f64, 0.8]).collect();
        let matrix = FeatureMatrix::new(columns(), rows).unwrap();
        AnomalyModel::train(&matrix, &ModelParams::default()).unwrap().model
    }

    struct Fixture {
        orchestrator: RetrainingOrchestrator,
        source: Arc<InMemoryTransactionSource>,
        feedback: Arc<FeedbackStore>,
        live: Arc<LiveModel>,
        _dirs: (tempfile::TempDir, tempfile::TempDir),
    }

    fn fixture_with(backend: Option<Arc<dyn TrainingBackend>>, config: RetrainingConfig) -> Fixture {
        let staging = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let storage = Arc::new(InMemoryObjectStorage::new());
        let source = Arc::new(InMemoryTransactionSource::default());
        let feedback = Arc::new(FeedbackStore::new(Box::new(InMemoryFeedbackStorage::new())));
        let live = Arc::new(LiveModel::with_model("transaction-anomaly", initial_model()));
        let backend = backend.unwrap_or_else(|| {
            Arc::new(LocalTrainingBackend::new(storage.clone(), work.path())) as Arc<dyn TrainingBackend>
        });

        let config = RetrainingConfig {
            staging_dir: staging.path().to_string_lossy().into_owned(),
            initial_backoff_ms: 1,
            ..config
        };
        let orchestrator = RetrainingOrchestrator::new(
            &config,
            ModelParams::default(),
            FeaturePreparer::new(columns()),
            RetrainingDeps {
                transactions: source.clone(),
                storage,
                backend,
                feedback: feedback.clone(),
                live: live.clone(),
            },
        );

        Fixture {
            orchestrator,
            source,
            feedback,
            live,
            _dirs: (staging, work),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(None, RetrainingConfig::default())
    }

    #[tokio::test]
    async fn test_successful_retrain_swaps_model() {
        let f = fixture();
        f.source.extend(transactions(40));
        let before = f.live.version().unwrap();

        let job = f.orchestrator.run_once(true).await.unwrap().unwrap();

        assert_eq!(job.state, JobState::Succeeded);
        assert!(job.dataset_uri.is_some());
        assert_eq!(job.attempts, 1);
        let after = f.live.version().unwrap();
        assert_ne!(after, before);
        assert_eq!(job.model_version.as_deref(), Some(after.as_str()));
        assert_eq!(f.orchestrator.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_small_dataset_keeps_prior_model() {
        let f = fixture();
        f.source.extend(transactions(4));
        let before = f.live.current().unwrap();

        let job = f.orchestrator.run_once(true).await.unwrap().unwrap();

        assert_eq!(job.state, JobState::Failed);
        assert!(job.failure.as_deref().unwrap().contains("Insufficient data"));
        assert!(job.started_at.is_none());
        let after = f.live.current().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(after.score_one(&[60.0, 0.8]).is_ok());
    }

    #[tokio::test]
    async fn test_unpreparable_history_records_are_skipped() {
        let f = fixture();
        f.source.extend(transactions(40));
        f.source.push(TransactionRecord::new("BAD", 10.0, "shop", "U1"));
        let before = f.live.version().unwrap();

        let job = f.orchestrator.run_once(true).await.unwrap().unwrap();

        assert_eq!(job.state, JobState::Succeeded, "{:?}", job.failure);
        assert_eq!(job.skipped_records, 1);
        assert_ne!(f.live.version().unwrap(), before);
    }

    #[tokio::test]
    async fn test_failed_job_holds_back_policy_triggers() {
        let config = RetrainingConfig {
            min_new_feedback: 1,
            ..RetrainingConfig::default()
        };
        let f = fixture_with(None, config);
        f.source.extend(transactions(4));
        f.feedback.collect("U1", "missed a fraud", 1).unwrap();
        assert_eq!(
            f.orchestrator.check_trigger().unwrap(),
            Some(TriggerReason::NewFeedback(1))
        );

        let job = f.orchestrator.run_once(false).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);

        assert_eq!(f.orchestrator.check_trigger().unwrap(), None);
        assert!(f.orchestrator.run_once(false).await.unwrap().is_none());

        f.source.extend(transactions(40));
        let forced = f.orchestrator.run_once(true).await.unwrap().unwrap();
        assert_eq!(forced.state, JobState::Succeeded);
        assert_eq!(f.orchestrator.check_trigger().unwrap(), None);
    }

    #[tokio::test]
    async fn test_feedback_trigger_and_watermark() {
        let config = RetrainingConfig {
            min_new_feedback: 3,
            ..RetrainingConfig::default()
        };
        let f = fixture_with(None, config);
        f.source.extend(transactions(30));

        assert_eq!(f.orchestrator.check_trigger().unwrap(), None);
        for rating in [1, 2, 5] {
            f.feedback.collect("U1", "missed a fraud", rating).unwrap();
        }
        assert_eq!(
            f.orchestrator.check_trigger().unwrap(),
            Some(TriggerReason::NewFeedback(3))
        );

        let job = f.orchestrator.run_once(false).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(f.orchestrator.new_feedback_count().unwrap(), 0);
        assert!(f.orchestrator.run_once(false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_before_training() {
        let f = fixture();
        f.source.extend(transactions(30));
        let before = f.live.version();

        let (job, cancel) = f.orchestrator.submit();
        cancel.cancel();
        let job = f.orchestrator.execute(job, cancel).await;

        assert!(job.is_cancelled());
        assert_eq!(f.live.version(), before);
        assert!(f.orchestrator.job(&job.id).unwrap().is_cancelled());
    }

    struct FlakyBackend {
        inner: LocalTrainingBackend,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl TrainingBackend for FlakyBackend {
        async fn train(&self, dataset_uri: &str, params: &ModelParams) -> Result<ModelArtifact> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ExternalError::retryable("training-backend", "capacity").into());
            }
            self.inner.train(dataset_uri, params).await
        }
    }

    struct FatalBackend(AtomicU32);

    #[async_trait]
    impl TrainingBackend for FatalBackend {
        async fn train(&self, _dataset_uri: &str, _params: &ModelParams) -> Result<ModelArtifact> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(ExternalError::fatal("training-backend", "access denied").into())
        }
    }

    struct StalledBackend;

    #[async_trait]
    impl TrainingBackend for StalledBackend {
        async fn train(&self, _dataset_uri: &str, _params: &ModelParams) -> Result<ModelArtifact> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ExternalError::fatal("training-backend", "unreachable").into())
        }
    }

    #[tokio::test]
    async fn test_transient_backend_failures_are_retried() {
        let storage = Arc::new(InMemoryObjectStorage::new());
        let work = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let backend = Arc::new(FlakyBackend {
            inner: LocalTrainingBackend::new(storage.clone(), work.path()),
            failures_left: AtomicU32::new(2),
        });
        let source = Arc::new(InMemoryTransactionSource::default());
        source.extend(transactions(30));
        let live = Arc::new(LiveModel::with_model("slot", initial_model()));

        let config = RetrainingConfig {
            staging_dir: staging.path().to_string_lossy().into_owned(),
            initial_backoff_ms: 1,
            ..RetrainingConfig::default()
        };
        let orchestrator = RetrainingOrchestrator::new(
            &config,
            ModelParams::default(),
            FeaturePreparer::new(columns()),
            RetrainingDeps {
                transactions: source,
                storage,
                backend,
                feedback: Arc::new(FeedbackStore::new(Box::new(InMemoryFeedbackStorage::new()))),
                live,
            },
        );

        let job = orchestrator.run_once(true).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.attempts, 3);
    }

    #[tokio::test]
    async fn test_fatal_backend_failure_is_not_retried() {
        let backend = Arc::new(FatalBackend(AtomicU32::new(0)));
        let f = fixture_with(
            Some(backend.clone() as Arc<dyn TrainingBackend>),
            RetrainingConfig::default(),
        );
        f.source.extend(transactions(30));
        let before = f.live.version();

        let job = f.orchestrator.run_once(true).await.unwrap().unwrap();

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
        assert_eq!(backend.0.load(Ordering::SeqCst), 1);
        assert_eq!(f.live.version(), before);
    }

    #[tokio::test]
    async fn test_training_deadline() {
        let f = fixture_with(
            Some(Arc::new(StalledBackend) as Arc<dyn TrainingBackend>),
            RetrainingConfig::default(),
        );
        f.source.extend(transactions(30));
        let orchestrator = f.orchestrator.with_training_deadline(Duration::from_millis(50));
        let before = f.live.version();

        let job = orchestrator.run_once(true).await.unwrap().unwrap();

        assert_eq!(job.state, JobState::Failed);
        assert!(job.failure.as_deref().unwrap().starts_with("Timed out"));
        assert_eq!(f.live.version(), before);
    }

    #[tokio::test]
    async fn test_layout_mismatch_is_rejected() {
        struct ForeignBackend(Arc<InMemoryObjectStorage>);

        #[async_trait]
        impl TrainingBackend for ForeignBackend {
            async fn train(&self, _dataset_uri: &str, _params: &ModelParams) -> Result<ModelArtifact> {
                let rows = (0..20).map(|i| vec![i as f64]).collect();
                let matrix = FeatureMatrix::new(vec!["hour_of_day".to_string()], rows).unwrap();
                let model = AnomalyModel::train(&matrix, &ModelParams::default())?.model;
                self.0.put("mem://foreign", serde_json::to_vec(&model)?);
                Ok(ModelArtifact {
                    uri: "mem://foreign".to_string(),
                })
            }
        }

        let staging = tempfile::tempdir().unwrap();
        let storage = Arc::new(InMemoryObjectStorage::new());
        let source = Arc::new(InMemoryTransactionSource::default());
        source.extend(transactions(30));
        let live = Arc::new(LiveModel::with_model("slot", initial_model()));
        let before = live.version();
        let config = RetrainingConfig {
            staging_dir: staging.path().to_string_lossy().into_owned(),
            ..RetrainingConfig::default()
        };
        let orchestrator = RetrainingOrchestrator::new(
            &config,
            ModelParams::default(),
            FeaturePreparer::new(columns()),
            RetrainingDeps {
                transactions: source,
                storage: storage.clone(),
                backend: Arc::new(ForeignBackend(storage)),
                feedback: Arc::new(FeedbackStore::new(Box::new(InMemoryFeedbackStorage::new()))),
                live: live.clone(),
            },
        );

        let job = orchestrator.run_once(true).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.failure.as_deref().unwrap().contains("layout"));
        assert_eq!(live.version(), before);
    }
}
