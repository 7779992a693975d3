//! Test Signal Producer
//!
//! Generates and publishes test transactions, call events and feedback to
//! NATS for engine testing.

use chrono::{Duration as ChronoDuration, Local, Utc};
use fraud_signal_engine::config::NatsConfig;
use fraud_signal_engine::types::{CallEvent, CallMetadata, FeedbackSubmission, TransactionRecord};
use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

const SPAM_CALLERS: [&str; 2] = ["+1234567890", "+0987654321"];

const PHISHING_LINES: [&str; 4] = [
    "This is your bank, an urgent payment is needed today",
    "Your account blocked, please verify your details",
    "Congratulations, claim your prize money now",
    "Immediate action required, click the link we sent",
];

const ORDINARY_LINES: [&str; 3] = [
    "Hi, just calling to confirm our meeting tomorrow",
    "Your order has shipped and should arrive on Friday",
    "Thanks for calling back, see you at the clinic",
];

/// Which inputs to publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Transactions,
    Calls,
    Feedback,
    All,
}

impl Stream {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "transactions" => Some(Self::Transactions),
            "calls" => Some(Self::Calls),
            "feedback" => Some(Self::Feedback),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn includes(self, other: Stream) -> bool {
        self == Stream::All || self == other
    }
}

/// Signal generator for testing
struct SignalGenerator {
    rng: rand::rngs::ThreadRng,
    transaction_counter: u64,
    call_counter: u64,
}

impl SignalGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            transaction_counter: 0,
            call_counter: 0,
        }
    }

    /// Generate a random legitimate transaction
    fn generate_legitimate(&mut self) -> TransactionRecord {
        self.transaction_counter += 1;
        let merchant = self.random_choice(&["grocer", "cafe", "fuel", "pharmacy", "bookshop"]);
        let user = format!("U{:04}", self.rng.gen_range(1..500));

        TransactionRecord::new(
            format!("T{:010}", self.transaction_counter),
            self.rng.gen_range(10.0..500.0),
            merchant,
            user,
        )
        .with_attribute("merchant_score", self.rng.gen_range(0.6..0.95))
        .with_attribute("user_activity_score", self.rng.gen_range(0.5..0.9))
    }

    /// Generate a suspicious transaction
    fn generate_suspicious(&mut self) -> TransactionRecord {
        self.transaction_counter += 1;
        let merchant = self.random_choice(&["giftcards-online", "crypto-exchange", "wire-transfer"]);
        let user = format!("U{:04}", self.rng.gen_range(1..500));

        TransactionRecord::new(
            format!("T{:010}", self.transaction_counter),
            self.rng.gen_range(5000.0..20000.0),
            merchant,
            user,
        )
        .with_attribute("merchant_score", self.rng.gen_range(0.0..0.15))
        .with_attribute("user_activity_score", self.rng.gen_range(0.0..0.1))
    }

    /// Generate an ordinary call with a matching transcript
    fn generate_call(&mut self) -> CallEvent {
        self.call_counter += 1;
        let caller = format!("+1555{:07}", self.rng.gen_range(0..10_000_000));
        let transcript = self.random_choice(&ORDINARY_LINES).to_string();
        CallEvent {
            metadata: CallMetadata::new(
                caller,
                self.receiver(),
                self.rng.gen_range(30..900),
                self.call_time(),
            ),
            transcript: Some(transcript),
        }
    }

    /// Generate a spam call: blacklisted, very short, or a phishing script
    fn generate_spam_call(&mut self) -> CallEvent {
        self.call_counter += 1;
        let (caller, duration, transcript) = match self.rng.gen_range(0..3) {
            0 => (self.random_choice(&SPAM_CALLERS).to_string(), self.rng.gen_range(30..300), None),
            1 => (
                format!("+1555{:07}", self.rng.gen_range(0..10_000_000)),
                self.rng.gen_range(1..10),
                None,
            ),
            _ => (
                format!("+1555{:07}", self.rng.gen_range(0..10_000_000)),
                self.rng.gen_range(30..300),
                Some(self.random_choice(&PHISHING_LINES).to_string()),
            ),
        };
        CallEvent {
            metadata: CallMetadata::new(caller, self.receiver(), duration, self.call_time()),
            transcript,
        }
    }

    /// Generate feedback; roughly one in ten is invalid
    fn generate_feedback(&mut self) -> FeedbackSubmission {
        let rating = if self.rng.gen_bool(0.1) {
            self.rng.gen_range(6..10)
        } else {
            self.rng.gen_range(1..=5)
        };
        FeedbackSubmission {
            user_id: format!("U{:04}", self.rng.gen_range(1..500)),
            comment: self
                .random_choice(&[
                    "Alert was correct, I did not make that purchase",
                    "False alarm, that was me",
                    "Too many alerts this week",
                    "Blocked the caller, thanks",
                ])
                .to_string(),
            rating,
        }
    }

    fn receiver(&mut self) -> String {
        format!("+1987{:07}", self.rng.gen_range(0..10_000_000))
    }

    fn call_time(&mut self) -> String {
        let offset = ChronoDuration::seconds(self.rng.gen_range(0..60));
        (Local::now().naive_local() - offset)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

/// One generated message and its subject
struct Outgoing {
    subject: String,
    suspicious: bool,
    payload: Vec<u8>,
    pretty: String,
}

fn encode<T: Serialize>(subject: &str, suspicious: bool, value: &T) -> anyhow::Result<Outgoing> {
    Ok(Outgoing {
        subject: subject.to_string(),
        suspicious,
        payload: serde_json::to_vec(value)?,
        pretty: serde_json::to_string_pretty(value)?,
    })
}

fn generate_round(
    generator: &mut SignalGenerator,
    stream: Stream,
    fraud_rate: f64,
    subjects: &NatsConfig,
) -> anyhow::Result<Vec<Outgoing>> {
    let mut batch = Vec::new();

    if stream.includes(Stream::Transactions) {
        let suspicious = generator.rng.gen_bool(fraud_rate);
        let transaction = if suspicious {
            generator.generate_suspicious()
        } else {
            generator.generate_legitimate()
        };
        batch.push(encode(&subjects.transaction_subject, suspicious, &transaction)?);
    }
    if stream.includes(Stream::Calls) {
        let suspicious = generator.rng.gen_bool(fraud_rate);
        let call = if suspicious {
            generator.generate_spam_call()
        } else {
            generator.generate_call()
        };
        batch.push(encode(&subjects.call_subject, suspicious, &call)?);
    }
    if stream.includes(Stream::Feedback) {
        let feedback = generator.generate_feedback();
        let invalid = !(1..=5).contains(&feedback.rating);
        batch.push(encode(&subjects.feedback_subject, invalid, &feedback)?);
    }

    Ok(batch)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Signal Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let stream_arg = args.get(2).map(|s| s.as_str()).unwrap_or("all");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let fraud_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.1);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    let stream = Stream::parse(stream_arg).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown stream '{}', expected transactions, calls, feedback or all",
            stream_arg
        )
    })?;
    if !(0.0..=1.0).contains(&fraud_rate) {
        anyhow::bail!("fraud rate must be between 0 and 1, got {}", fraud_rate);
    }

    info!(
        nats_url = %nats_url,
        stream = ?stream,
        count = count,
        fraud_rate = fraud_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let subjects = NatsConfig::default();

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(stream, count, fraud_rate, delay_ms, &subjects).await;
        }
    };

    let mut generator = SignalGenerator::new();
    info!("Starting to publish {} rounds...", count);

    let mut published = 0u64;
    let mut suspicious_count = 0u64;

    for i in 0..count {
        for message in generate_round(&mut generator, stream, fraud_rate, &subjects)? {
            if message.suspicious {
                suspicious_count += 1;
            }
            client.publish(message.subject, message.payload.into()).await?;
            published += 1;
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Published {}/{} rounds ({} messages, {} suspicious)",
                i + 1,
                count,
                published,
                suspicious_count
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    client.flush().await?;
    info!(
        "Completed! Published {} messages ({} suspicious)",
        published, suspicious_count
    );

    Ok(())
}

async fn run_dry_mode(
    stream: Stream,
    count: u64,
    fraud_rate: f64,
    delay_ms: u64,
    subjects: &NatsConfig,
) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = SignalGenerator::new();
    let started = Utc::now();

    for i in 0..count {
        let batch = generate_round(&mut generator, stream, fraud_rate, subjects)?;
        if (i + 1) % 10 == 0 || i == 0 {
            for message in &batch {
                info!("Sample on {} (round {}):\n{}", message.subject, i + 1, message.pretty);
            }
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Dry run finished after {}s",
        (Utc::now() - started).num_seconds()
    );
    Ok(())
}
