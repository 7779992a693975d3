//! End-to-end scenarios across the rule evaluators, feedback store, anomaly
//! model and retraining orchestrator.

use fraud_signal_engine::config::{AppConfig, RetrainingConfig, TranscriptConfig};
use fraud_signal_engine::feedback::{FeedbackStore, InMemoryFeedbackStorage, JsonLinesFeedbackStorage};
use fraud_signal_engine::models::{AnomalyModel, InferenceEngine, LiveModel, ModelParams};
use fraud_signal_engine::retraining::{
    InMemoryTransactionSource, JobState, LocalTrainingBackend, RetrainingDeps, RetrainingOrchestrator,
};
use fraud_signal_engine::screening::CallScreener;
use fraud_signal_engine::spam::metadata::{REASON_BLACKLISTED, REASON_SHORT_CALL};
use fraud_signal_engine::spam::transcript::REASON_PHISHING;
use fraud_signal_engine::spam::{CallMetadataEvaluator, InMemoryCallLog, TranscriptAnalyzer};
use fraud_signal_engine::storage::InMemoryObjectStorage;
use fraud_signal_engine::types::{CallEvent, CallMetadata, TransactionRecord};
use fraud_signal_engine::{EngineError, FeatureMatrix, FeaturePreparer};
use std::collections::HashSet;
use std::sync::Arc;

fn columns() -> Vec<String> {
    vec![
        "amount".to_string(),
        "merchant_score".to_string(),
        "user_activity_score".to_string(),
    ]
}

fn transaction(i: usize) -> TransactionRecord {
    let jitter = (i % 9) as f64;
    TransactionRecord::new(format!("T{:05}", i), 60.0 + jitter * 12.0, "grocer", "U001")
        .with_attribute("merchant_score", 0.75 + jitter * 0.01)
        .with_attribute("user_activity_score", 0.6 + (i % 4) as f64 * 0.02)
}

fn training_matrix() -> FeatureMatrix {
    let preparer = FeaturePreparer::new(columns());
    let records: Vec<_> = (0..80).map(|i| transaction(i).to_record()).collect();
    preparer.prepare(&records).unwrap()
}

#[test]
fn blacklisted_short_call_reports_both_reasons() {
    let evaluator = CallMetadataEvaluator::new(
        &AppConfig::default().call_rules,
        Arc::new(InMemoryCallLog::new()),
    );
    let call = CallMetadata::new("+1234567890", "+1987654321", 8, "2025-01-20 10:15:00");

    let verdict = evaluator.evaluate(&call).unwrap();

    assert!(verdict.is_spam);
    assert!(verdict.reasons.contains(&REASON_BLACKLISTED.to_string()));
    assert!(verdict.reasons.contains(&REASON_SHORT_CALL.to_string()));
}

#[test]
fn blacklisted_caller_is_spam_regardless_of_duration() {
    let evaluator = CallMetadataEvaluator::new(
        &AppConfig::default().call_rules,
        Arc::new(InMemoryCallLog::new()),
    );
    for duration in [0, 9, 10, 600, 86_400] {
        let call = CallMetadata::new("+0987654321", "+1987654321", duration, "2025-01-20 10:15:00");
        let verdict = evaluator.evaluate(&call).unwrap();
        assert!(verdict.is_spam, "duration {duration}");
        assert_eq!(verdict.reasons[0], REASON_BLACKLISTED);
    }
}

#[tokio::test]
async fn urgent_payment_transcript_is_phishing() {
    let analyzer = TranscriptAnalyzer::new(&TranscriptConfig::default());

    let result = analyzer
        .analyze("Hello, this is your bank. We need an URGENT PAYMENT today.")
        .await
        .unwrap();

    assert!(result.verdict.is_spam);
    assert_eq!(result.verdict.reasons, vec![REASON_PHISHING]);
    assert_eq!(result.detected_keywords, vec!["urgent payment"]);
}

#[tokio::test]
async fn screened_call_combines_metadata_and_transcript() {
    let screener = CallScreener::new(&AppConfig::default(), Arc::new(InMemoryCallLog::new()));
    let event = CallEvent {
        metadata: CallMetadata::new("+1234567890", "+1987654321", 8, "2025-01-20 10:15:00"),
        transcript: Some("urgent payment needed, click the link".to_string()),
    };

    let assessment = screener.screen(&event).await.unwrap();

    assert!(assessment.is_spam());
    assert_eq!(
        assessment.alert.reasons,
        vec![REASON_BLACKLISTED, REASON_SHORT_CALL, REASON_PHISHING]
    );
    assert_eq!(assessment.alert.user_id.as_deref(), Some("+1987654321"));
    assert!(assessment.alert.risk_score >= AppConfig::default().detection.threshold);
}

#[test]
fn out_of_range_ratings_leave_store_unchanged() {
    let store = FeedbackStore::new(Box::new(InMemoryFeedbackStorage::new()));
    store.collect("U001", "helpful", 4).unwrap();

    for rating in [-1, 0, 6, 100] {
        let err = store.collect("U001", "out of range", rating).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
    assert_eq!(store.len().unwrap(), 1);
}

#[test]
fn empty_store_summary_is_zeroed() {
    let store = FeedbackStore::new(Box::new(InMemoryFeedbackStorage::new()));
    let summary = store.summary().unwrap();

    assert_eq!(summary.count, 0);
    assert_eq!(summary.mean_rating, 0.0);
    assert_eq!(summary.histogram.len(), 5);
    assert!(summary.histogram.values().all(|&c| c == 0));
}

#[test]
fn summary_counts_every_persisted_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("feedback.jsonl");
    let n = 23;

    {
        let store = FeedbackStore::new(Box::new(JsonLinesFeedbackStorage::open(&path).unwrap()));
        for i in 0..n {
            store
                .collect(&format!("U{:03}", i), "reviewed the alert", (i % 5 + 1) as i64)
                .unwrap();
        }
    }

    let reopened = FeedbackStore::new(Box::new(JsonLinesFeedbackStorage::open(&path).unwrap()));
    let summary = reopened.summary().unwrap();
    assert_eq!(summary.count, n);
    assert_eq!(summary.histogram.values().sum::<usize>(), n);
}

#[test]
fn fixed_seed_training_is_reproducible() {
    let matrix = training_matrix();
    let params = ModelParams::default();

    let first = AnomalyModel::train(&matrix, &params).unwrap();
    let second = AnomalyModel::train(&matrix, &params).unwrap();

    assert_eq!(first.training_labels, second.training_labels);
    let probe = vec![vec![75.0, 0.78, 0.62], vec![9_500.0, 0.02, 0.01]];
    assert_eq!(
        first.model.score(&probe).unwrap(),
        second.model.score(&probe).unwrap()
    );
}

#[test]
fn known_inlier_scores_as_inlier_and_dimension_is_enforced() {
    let matrix = training_matrix();
    let trained = AnomalyModel::train(&matrix, &ModelParams::default()).unwrap();

    let inlier = trained
        .training_labels
        .iter()
        .position(|&outlier| !outlier)
        .unwrap();
    let scores = trained.model.score(&[matrix.rows[inlier].clone()]).unwrap();
    assert!(!scores[0].is_outlier);

    let err = trained.model.score(&[vec![75.0, 0.78]]).unwrap_err();
    assert!(matches!(
        err,
        EngineError::DimensionMismatch { expected: 3, actual: 2 }
    ));
}

#[test]
fn constant_column_trains_and_scores() {
    let rows: Vec<Vec<f64>> = (0..30)
        .map(|i| vec![100.0 + (i % 6) as f64, 0.5, 0.5])
        .collect();
    let matrix = FeatureMatrix::new(columns(), rows).unwrap();
    let trained = AnomalyModel::train(&matrix, &ModelParams::default()).unwrap();

    let scores = trained.model.score(&[vec![102.0, 0.5, 0.5]]).unwrap();
    assert!(scores[0].score.is_finite());
    assert!(!scores[0].is_outlier);
}

struct Harness {
    orchestrator: Arc<RetrainingOrchestrator>,
    source: Arc<InMemoryTransactionSource>,
    live: Arc<LiveModel>,
    engine: Arc<InferenceEngine>,
    _dirs: (tempfile::TempDir, tempfile::TempDir),
}

fn harness() -> Harness {
    let staging = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let storage = Arc::new(InMemoryObjectStorage::new());
    let source = Arc::new(InMemoryTransactionSource::default());
    let initial = AnomalyModel::train(&training_matrix(), &ModelParams::default())
        .unwrap()
        .model;
    let live = Arc::new(LiveModel::with_model("transaction-anomaly", initial));
    let preparer = FeaturePreparer::new(columns());

    let config = RetrainingConfig {
        staging_dir: staging.path().to_string_lossy().into_owned(),
        initial_backoff_ms: 1,
        ..RetrainingConfig::default()
    };
    let orchestrator = RetrainingOrchestrator::new(
        &config,
        ModelParams::default(),
        preparer.clone(),
        RetrainingDeps {
            transactions: source.clone(),
            storage: storage.clone(),
            backend: Arc::new(LocalTrainingBackend::new(storage, work.path())),
            feedback: Arc::new(FeedbackStore::new(Box::new(InMemoryFeedbackStorage::new()))),
            live: live.clone(),
        },
    );

    Harness {
        orchestrator: Arc::new(orchestrator),
        source,
        engine: Arc::new(InferenceEngine::new(preparer, live.clone())),
        live,
        _dirs: (staging, work),
    }
}

#[tokio::test]
async fn small_dataset_retrain_keeps_serving_prior_model() {
    let h = harness();
    h.source.extend((0..4).map(transaction));
    let before = h.live.current().unwrap();

    let job = h.orchestrator.run_once(true).await.unwrap().unwrap();

    assert_eq!(job.state, JobState::Failed);
    assert!(job.failure.as_deref().unwrap().contains("Insufficient data"));
    let after = h.live.current().unwrap();
    assert!(Arc::ptr_eq(&before, &after));

    let prediction = h.engine.predict(&transaction(3)).unwrap();
    assert_eq!(prediction.model_version, before.version());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scoring_continues_across_a_model_swap() {
    let h = harness();
    h.source.extend((0..200).map(transaction));
    let before = h.live.version().unwrap();

    let scorers: Vec<_> = (0..4)
        .map(|worker| {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                let mut versions = HashSet::new();
                for i in 0..200 {
                    let prediction = engine.predict(&transaction(worker * 1000 + i)).unwrap();
                    assert!(prediction.anomaly.score > 0.0 && prediction.anomaly.score <= 1.0);
                    versions.insert(prediction.model_version);
                    tokio::task::yield_now().await;
                }
                versions
            })
        })
        .collect();

    let job = h.orchestrator.run_once(true).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Succeeded);
    let after = h.live.version().unwrap();
    assert_ne!(before, after);

    for scorer in scorers {
        let versions = scorer.await.unwrap();
        assert!(versions.iter().all(|v| *v == before || *v == after));
    }
    assert_eq!(h.engine.predict(&transaction(7)).unwrap().model_version, after);
}
