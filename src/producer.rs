//! NATS publisher for fraud alerts and user notifications

use crate::error::ExternalError;
use crate::types::alert::FraudAlert;
use anyhow::Result;
use async_nats::Client;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Subject line used for transaction alerts
pub const ALERT_SUBJECT_LINE: &str = "Urgent: Fraudulent Transaction Alert";

/// Notification delivery collaborator (SMS, email, push)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &str, subject: &str, message: &str) -> std::result::Result<(), ExternalError>;
}

/// Envelope published for the delivery side to pick up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Human-readable alert body for a flagged transaction
pub fn format_alert(transaction_id: &str, anomaly_score: f64, user_id: &str) -> String {
    format!(
        "Suspicious activity detected!\n\n\
         Transaction ID: {}\n\
         Anomaly Score: {}\n\
         User ID: {}\n\n\
         Please review this transaction immediately.",
        transaction_id, anomaly_score, user_id
    )
}

/// Producer for publishing fraud alerts to NATS
#[derive(Clone)]
pub struct AlertProducer {
    client: Client,
    subject: String,
    notification_subject: String,
}

impl AlertProducer {
    pub fn new(client: Client, subject: &str, notification_subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
            notification_subject: notification_subject.to_string(),
        }
    }

    /// Publish a fraud alert
    pub async fn publish(&self, alert: &FraudAlert) -> Result<()> {
        let payload = serde_json::to_vec(alert)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            alert_id = %alert.alert_id,
            subject_id = %alert.subject_id,
            risk_score = alert.risk_score,
            "Published fraud alert"
        );

        Ok(())
    }
}

#[async_trait]
impl Notifier for AlertProducer {
    async fn notify(&self, recipient: &str, subject: &str, message: &str) -> std::result::Result<(), ExternalError> {
        let notification = Notification {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
        };
        let payload = serde_json::to_vec(&notification)
            .map_err(|e| ExternalError::fatal("notifier", e.to_string()))?;

        self.client
            .publish(self.notification_subject.clone(), payload.into())
            .await
            .map_err(|e| ExternalError::retryable("notifier", e.to_string()))?;

        debug!(recipient = %recipient, subject = %subject, "Notification published");
        Ok(())
    }
}
