//! Fraud Signal Engine - Main Entry Point
//!
//! Consumes transactions, calls and feedback from NATS, publishes fraud
//! alerts, and keeps the transaction anomaly model retrained in the
//! background.

use anyhow::{Context, Result};
use async_nats::Message;
use fraud_signal_engine::{
    config::{AppConfig, LoggingConfig},
    consumer::{decode_payload, SignalConsumer},
    error::EngineError,
    feature_extractor::FeaturePreparer,
    feedback::{FeedbackStorage, FeedbackStore, InMemoryFeedbackStorage, JsonLinesFeedbackStorage},
    metrics::{MetricsReporter, PipelineMetrics},
    models::{AnomalyModel, InferenceEngine, LiveModel, ModelParams},
    producer::{format_alert, AlertProducer, Notifier, ALERT_SUBJECT_LINE},
    retraining::{InMemoryTransactionSource, LocalTrainingBackend, RetrainingDeps, RetrainingOrchestrator},
    screening::CallScreener,
    spam::InMemoryCallLog,
    storage::{LocalObjectStorage, ObjectStorage},
    types::{CallEvent, FeedbackSubmission, TransactionRecord},
};
use futures::StreamExt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared state for the message handlers
struct Engine {
    config: AppConfig,
    inference: InferenceEngine,
    screener: CallScreener,
    feedback: Arc<FeedbackStore>,
    history: Arc<InMemoryTransactionSource>,
    producer: AlertProducer,
    metrics: Arc<PipelineMetrics>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!("Starting Fraud Signal Engine");
    info!(
        "Feature columns: {:?}, contamination: {:.3}, estimators: {}",
        config.features.columns, config.model.contamination, config.model.n_estimators
    );

    let metrics = Arc::new(PipelineMetrics::new());
    let preparer = FeaturePreparer::new(config.features.columns.clone());
    let params = ModelParams::from(&config.model);
    let live = Arc::new(LiveModel::new(config.retraining.target_slot.clone()));
    let history = Arc::new(InMemoryTransactionSource::default());

    if let Some(path) = &config.model.bootstrap_dataset {
        bootstrap_model(Path::new(path), &preparer, &params, &live, &history)
            .with_context(|| format!("Failed to bootstrap model from {}", path))?;
    } else {
        warn!("No bootstrap dataset configured; transactions are not scored until the first retrain");
    }

    let feedback_storage: Box<dyn FeedbackStorage> = match &config.feedback.path {
        Some(path) => Box::new(JsonLinesFeedbackStorage::open(path).context("Failed to open feedback log")?),
        None => Box::new(InMemoryFeedbackStorage::new()),
    };
    let feedback = Arc::new(FeedbackStore::new(feedback_storage));
    info!(entries = feedback.len()?, "Feedback store ready");

    let storage: Arc<dyn ObjectStorage> = Arc::new(LocalObjectStorage::new(&config.retraining.storage_dir));
    let backend = Arc::new(LocalTrainingBackend::new(
        storage.clone(),
        Path::new(&config.retraining.staging_dir).join("artifacts"),
    ));
    let orchestrator = Arc::new(
        RetrainingOrchestrator::new(
            &config.retraining,
            params,
            preparer.clone(),
            RetrainingDeps {
                transactions: history.clone(),
                storage,
                backend,
                feedback: feedback.clone(),
                live: live.clone(),
            },
        )
        .with_metrics(metrics.clone()),
    );
    if live.current().is_some() {
        orchestrator.mark_feedback_consumed()?;
    }

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = SignalConsumer::new(client.clone(), &config.nats);
    let producer = AlertProducer::new(
        client.clone(),
        &config.nats.alert_subject,
        &config.nats.notification_subject,
    );
    let transactions = consumer.subscribe_transactions().await?;
    let calls = consumer.subscribe_calls().await?;
    let feedback_messages = consumer.subscribe_feedback().await?;
    info!("Publishing alerts to: {}", config.nats.alert_subject);

    let workers = config.pipeline.workers;
    let metrics_interval = config.pipeline.metrics_interval_secs;
    let screener = CallScreener::new(&config, Arc::new(InMemoryCallLog::new()));
    let engine = Arc::new(Engine {
        inference: InferenceEngine::new(preparer, live),
        screener,
        feedback,
        history,
        producer,
        metrics: metrics.clone(),
        config,
    });

    let shutdown = CancellationToken::new();

    tokio::spawn(MetricsReporter::new(metrics.clone(), metrics_interval).start());

    let retrain_task = {
        let orchestrator = orchestrator.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { orchestrator.run(shutdown).await })
    };

    let tasks = vec![
        tokio::spawn(consume(
            "transactions",
            transactions,
            workers,
            shutdown.clone(),
            engine.clone(),
            handle_transaction,
        )),
        tokio::spawn(consume(
            "calls",
            calls,
            workers,
            shutdown.clone(),
            engine.clone(),
            handle_call,
        )),
        tokio::spawn(consume(
            "feedback",
            feedback_messages,
            workers,
            shutdown.clone(),
            engine.clone(),
            handle_feedback,
        )),
    ];

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    shutdown.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Consumer task panicked");
        }
    }
    if let Err(e) = retrain_task.await {
        error!(error = %e, "Retraining task panicked");
    }

    info!("Engine shutting down...");
    metrics.print_summary();
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("fraud_signal_engine={}", logging.level).parse()?);

    if logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

/// Train the initial model from a JSON array of transactions
fn bootstrap_model(
    path: &Path,
    preparer: &FeaturePreparer,
    params: &ModelParams,
    live: &LiveModel,
    history: &InMemoryTransactionSource,
) -> Result<()> {
    let bytes = std::fs::read(path)?;
    let records: Vec<TransactionRecord> = serde_json::from_slice(&bytes)?;
    let matrix = preparer.prepare(&records.iter().map(|r| r.to_record()).collect::<Vec<_>>())?;
    let trained = AnomalyModel::train(&matrix, params)?;

    info!(
        samples = matrix.len(),
        outliers = trained.outlier_count(),
        version = %trained.model.version(),
        "Bootstrap model trained"
    );
    live.swap(trained.model);
    history.extend(records);
    Ok(())
}

/// Process messages from one subscription with bounded concurrency
async fn consume<F, Fut>(
    name: &'static str,
    mut subscription: async_nats::Subscriber,
    workers: usize,
    shutdown: CancellationToken,
    engine: Arc<Engine>,
    handler: F,
) where
    F: Fn(Arc<Engine>, Message) -> Fut + Copy + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers));
    info!(stream = name, workers = workers, "Processing loop started");

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = subscription.next() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let engine = engine.clone();
        tokio::spawn(async move {
            handler(engine, message).await;
            drop(permit);
        });
    }

    info!(stream = name, "Processing loop stopped");
}

async fn handle_transaction(engine: Arc<Engine>, message: Message) {
    let start_time = Instant::now();
    let transaction: TransactionRecord = match decode_payload(&message.subject, &message.payload) {
        Ok(transaction) => transaction,
        Err(e) => {
            warn!(error = %e, "Failed to deserialize transaction");
            engine.metrics.record_error();
            return;
        }
    };
    if let Err(e) = engine.inference.validate(&transaction) {
        warn!(transaction_id = %transaction.transaction_id, error = %e, "Transaction rejected");
        engine.metrics.record_error();
        return;
    }
    engine.history.push(transaction.clone());

    let prediction = match engine.inference.predict(&transaction) {
        Ok(prediction) => prediction,
        Err(EngineError::ModelNotReady) => {
            debug!(transaction_id = %transaction.transaction_id, "No live model yet, transaction recorded only");
            return;
        }
        Err(e) if e.is_input_error() => {
            warn!(transaction_id = %transaction.transaction_id, error = %e, "Transaction rejected");
            engine.metrics.record_error();
            return;
        }
        Err(e) => {
            error!(transaction_id = %transaction.transaction_id, error = %e, "Scoring failed");
            engine.metrics.record_error();
            return;
        }
    };

    let processing_time = start_time.elapsed();
    engine
        .metrics
        .record_transaction(processing_time, prediction.anomaly.score);

    if !prediction.anomaly.is_outlier {
        debug!(
            transaction_id = %transaction.transaction_id,
            score = prediction.anomaly.score,
            processing_time_us = processing_time.as_micros() as u64,
            "Transaction processed (inlier)"
        );
        return;
    }

    let alert = prediction.to_alert(&transaction, &engine.config.detection.risk_levels);
    engine.metrics.record_alert(alert.risk_level.as_str());
    match engine.producer.publish(&alert).await {
        Ok(()) => info!(
            transaction_id = %transaction.transaction_id,
            score = prediction.anomaly.score,
            risk_level = ?alert.risk_level,
            model_version = %prediction.model_version,
            "Fraud alert published"
        ),
        Err(e) => error!(transaction_id = %transaction.transaction_id, error = %e, "Failed to publish fraud alert"),
    }

    if let Some(recipient) = &engine.config.detection.notify_recipient {
        let body = format_alert(
            &transaction.transaction_id,
            prediction.anomaly.score,
            &transaction.user_id,
        );
        if let Err(e) = engine.producer.notify(recipient, ALERT_SUBJECT_LINE, &body).await {
            error!(transaction_id = %transaction.transaction_id, error = %e, "Failed to send notification");
        }
    }
}

async fn handle_call(engine: Arc<Engine>, message: Message) {
    let start_time = Instant::now();
    let event: CallEvent = match decode_payload(&message.subject, &message.payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Failed to deserialize call event");
            engine.metrics.record_error();
            return;
        }
    };

    let assessment = match engine.screener.screen(&event).await {
        Ok(assessment) => assessment,
        Err(e) => {
            warn!(caller_id = %event.metadata.caller_id, error = %e, "Call screening failed");
            engine.metrics.record_error();
            return;
        }
    };

    let is_spam = assessment.is_spam();
    engine.metrics.record_call(start_time.elapsed(), is_spam);
    if !is_spam && assessment.alert.risk_score < engine.config.detection.threshold {
        debug!(caller_id = %event.metadata.caller_id, "Call processed (clean)");
        return;
    }

    engine.metrics.record_alert(assessment.alert.risk_level.as_str());
    match engine.producer.publish(&assessment.alert).await {
        Ok(()) => info!(
            caller_id = %event.metadata.caller_id,
            risk_score = assessment.alert.risk_score,
            reasons = ?assessment.alert.reasons,
            "Spam call alert published"
        ),
        Err(e) => error!(caller_id = %event.metadata.caller_id, error = %e, "Failed to publish call alert"),
    }
}

async fn handle_feedback(engine: Arc<Engine>, message: Message) {
    let submission: FeedbackSubmission = match decode_payload(&message.subject, &message.payload) {
        Ok(submission) => submission,
        Err(e) => {
            warn!(error = %e, "Failed to deserialize feedback");
            engine.metrics.record_error();
            return;
        }
    };

    let store = engine.feedback.clone();
    let result = tokio::task::spawn_blocking(move || {
        store.collect(&submission.user_id, &submission.comment, submission.rating)
    })
    .await;

    match result {
        Ok(Ok(entry)) => {
            engine.metrics.record_feedback(true);
            debug!(user_id = %entry.user_id, rating = entry.rating, "Feedback stored");
        }
        Ok(Err(e)) => {
            engine.metrics.record_feedback(false);
            warn!(error = %e, "Feedback rejected");
        }
        Err(e) => error!(error = %e, "Feedback task failed"),
    }
}
