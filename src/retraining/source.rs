//! Transaction history feeding the retraining dataset

use crate::error::ExternalError;
use crate::types::transaction::TransactionRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{PoisonError, RwLock};

#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Transactions with `timestamp >= since`, oldest first
    async fn transactions_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TransactionRecord>, ExternalError>;
}

/// Bounded in-process history of ingested transactions
#[derive(Debug)]
pub struct InMemoryTransactionSource {
    records: RwLock<Vec<TransactionRecord>>,
    capacity: usize,
}

impl InMemoryTransactionSource {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Record an ingested transaction, evicting the oldest past capacity
    pub fn push(&self, record: TransactionRecord) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.push(record);
        if records.len() > self.capacity {
            let excess = records.len() - self.capacity;
            records.drain(..excess);
        }
    }

    pub fn extend(&self, records: impl IntoIterator<Item = TransactionRecord>) {
        for record in records {
            self.push(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryTransactionSource {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl TransactionSource for InMemoryTransactionSource {
    async fn transactions_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TransactionRecord>, ExternalError> {
        let mut selected: Vec<TransactionRecord> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.timestamp >= since)
            .cloned()
            .collect();
        selected.sort_by_key(|r| r.timestamp);
        Ok(selected)
    }
}
