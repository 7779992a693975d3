//! Transaction records scored by the anomaly model

use crate::feature_extractor::Record;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A payment transaction as ingested from upstream systems
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique transaction identifier
    pub transaction_id: String,

    /// Transaction amount
    pub amount: f64,

    /// Merchant name or identifier (categorical)
    pub merchant: String,

    /// Transaction time
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Account holder
    pub user_id: String,

    /// Additional numeric attributes (merchant_score, user_activity_score, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
}

impl TransactionRecord {
    /// Create a new transaction with required fields
    pub fn new(
        transaction_id: impl Into<String>,
        amount: f64,
        merchant: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            amount,
            merchant: merchant.into(),
            timestamp: Utc::now(),
            user_id: user_id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Attach a numeric attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Set the transaction time
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Named view of the record for the feature preparer.
    ///
    /// Categorical fields stay strings, so selecting them as feature columns
    /// is rejected rather than silently encoded.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("amount".to_string(), Value::from(self.amount));
        record.insert(
            "hour_of_day".to_string(),
            Value::from(self.timestamp.hour() as f64),
        );
        record.insert(
            "day_of_week".to_string(),
            Value::from(self.timestamp.weekday().num_days_from_monday() as f64),
        );
        record.insert("merchant".to_string(), Value::from(self.merchant.clone()));
        record.insert("user_id".to_string(), Value::from(self.user_id.clone()));
        for (name, value) in &self.attributes {
            // Non-finite floats become null, which the preparer reports
            record.insert(name.clone(), Value::from(*value));
        }
        record
    }
}
