//! Throughput and verdict statistics for the signal pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline performance
pub struct PipelineMetrics {
    /// Transactions scored
    pub transactions_processed: AtomicU64,
    /// Calls evaluated by the spam rules
    pub calls_processed: AtomicU64,
    /// Calls flagged as spam
    pub spam_calls: AtomicU64,
    /// Alerts published
    pub alerts_generated: AtomicU64,
    /// Feedback entries accepted
    pub feedback_collected: AtomicU64,
    /// Feedback submissions rejected by validation
    pub feedback_rejected: AtomicU64,
    pub retrains_succeeded: AtomicU64,
    pub retrains_failed: AtomicU64,
    /// Inputs that failed validation or scoring
    pub errors: AtomicU64,
    alerts_by_level: RwLock<HashMap<String, u64>>,
    /// Processing times in microseconds
    processing_times: RwLock<Vec<u64>>,
    /// Anomaly score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            transactions_processed: AtomicU64::new(0),
            calls_processed: AtomicU64::new(0),
            spam_calls: AtomicU64::new(0),
            alerts_generated: AtomicU64::new(0),
            feedback_collected: AtomicU64::new(0),
            feedback_rejected: AtomicU64::new(0),
            retrains_succeeded: AtomicU64::new(0),
            retrains_failed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            alerts_by_level: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a scored transaction
    pub fn record_transaction(&self, processing_time: Duration, anomaly_score: f64) {
        self.transactions_processed.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(processing_time);

        let bucket = (anomaly_score.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        self.score_buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner)[bucket] += 1;
    }

    /// Record an evaluated call
    pub fn record_call(&self, processing_time: Duration, is_spam: bool) {
        self.calls_processed.fetch_add(1, Ordering::Relaxed);
        if is_spam {
            self.spam_calls.fetch_add(1, Ordering::Relaxed);
        }
        self.record_processing_time(processing_time);
    }

    fn record_processing_time(&self, processing_time: Duration) {
        let mut times = self
            .processing_times
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        times.push(processing_time.as_micros() as u64);
        // Keep only the most recent samples
        if times.len() > 10000 {
            times.drain(0..5000);
        }
    }

    pub fn record_alert(&self, risk_level: &str) {
        self.alerts_generated.fetch_add(1, Ordering::Relaxed);
        *self
            .alerts_by_level
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(risk_level.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_feedback(&self, accepted: bool) {
        if accepted {
            self.feedback_collected.fetch_add(1, Ordering::Relaxed);
        } else {
            self.feedback_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_retrain(&self, succeeded: bool) {
        if succeeded {
            self.retrains_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.retrains_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted = self
            .processing_times
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if sorted.is_empty() {
            return ProcessingStats::default();
        }
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.5),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Events (transactions and calls) per second since start
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let events = self.transactions_processed.load(Ordering::Relaxed)
                + self.calls_processed.load(Ordering::Relaxed);
            events as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        *self.score_buckets.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_alerts_by_level(&self) -> HashMap<String, u64> {
        self.alerts_by_level
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn print_summary(&self) {
        let tx_count = self.transactions_processed.load(Ordering::Relaxed);
        let call_count = self.calls_processed.load(Ordering::Relaxed);
        let spam_count = self.spam_calls.load(Ordering::Relaxed);
        let alert_count = self.alerts_generated.load(Ordering::Relaxed);
        let spam_rate = if call_count > 0 {
            (spam_count as f64 / call_count as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();
        let alerts_by_level = self.get_alerts_by_level();
        let score_dist = self.get_score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            FRAUD SIGNAL ENGINE - METRICS SUMMARY             ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Transactions Scored:    {:>8}  │  Throughput: {:>6.1} ev/s ║",
            tx_count, throughput
        );
        info!(
            "║ Calls Evaluated:        {:>8}  │  Spam Rate:  {:>6.1}%     ║",
            call_count, spam_rate
        );
        info!(
            "║ Alerts Published:       {:>8}  │  Errors:     {:>8}    ║",
            alert_count,
            self.errors.load(Ordering::Relaxed)
        );
        info!(
            "║ Feedback: {:>6} accepted {:>6} rejected │ Retrains: {:>3} ok {:>3} failed ║",
            self.feedback_collected.load(Ordering::Relaxed),
            self.feedback_rejected.load(Ordering::Relaxed),
            self.retrains_succeeded.load(Ordering::Relaxed),
            self.retrains_failed.load(Ordering::Relaxed)
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Alerts by Risk Level:                                        ║");
        for (level, count) in &alerts_by_level {
            let pct = if alert_count > 0 {
                (*count as f64 / alert_count as f64) * 100.0
            } else {
                0.0
            };
            info!("║   {:10}: {:>6} ({:>5.1}%)                                ║", level, count, pct);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Anomaly Score Distribution:                                  ║");
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
