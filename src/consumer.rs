//! NATS subscriptions for incoming transactions, calls and feedback

use crate::config::NatsConfig;
use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use serde::de::DeserializeOwned;
use tracing::info;

/// Subscribes to the engine's input subjects
pub struct SignalConsumer {
    client: Client,
    transaction_subject: String,
    call_subject: String,
    feedback_subject: String,
}

impl SignalConsumer {
    pub fn new(client: Client, config: &NatsConfig) -> Self {
        Self {
            client,
            transaction_subject: config.transaction_subject.clone(),
            call_subject: config.call_subject.clone(),
            feedback_subject: config.feedback_subject.clone(),
        }
    }

    pub async fn subscribe_transactions(&self) -> Result<Subscriber> {
        self.subscribe(&self.transaction_subject).await
    }

    pub async fn subscribe_calls(&self) -> Result<Subscriber> {
        self.subscribe(&self.call_subject).await
    }

    pub async fn subscribe_feedback(&self) -> Result<Subscriber> {
        self.subscribe(&self.feedback_subject).await
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscriber> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .with_context(|| format!("Failed to subscribe to {}", subject))?;
        info!(subject = %subject, "Subscribed");
        Ok(subscriber)
    }
}

/// Decode a JSON message payload
pub fn decode_payload<T: DeserializeOwned>(subject: &str, payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).with_context(|| format!("Malformed message on {}", subject))
}
