//! The model currently serving scoring requests

use crate::models::anomaly::AnomalyModel;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Shared slot holding the live anomaly model.
///
/// Readers clone the `Arc` and score without holding the lock; a swap replaces
/// the pointer in one assignment, so readers see either the old or the new
/// model, never a mix.
#[derive(Debug, Default)]
pub struct LiveModel {
    slot: String,
    current: RwLock<Option<Arc<AnomalyModel>>>,
}

impl LiveModel {
    /// Create an empty slot
    pub fn new(slot: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            current: RwLock::new(None),
        }
    }

    /// Create a slot already serving `model`
    pub fn with_model(slot: impl Into<String>, model: AnomalyModel) -> Self {
        Self {
            slot: slot.into(),
            current: RwLock::new(Some(Arc::new(model))),
        }
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Snapshot of the model in service
    pub fn current(&self) -> Option<Arc<AnomalyModel>> {
        // The guarded value is a single pointer, so a poisoned lock still holds
        // a complete model
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Version of the model in service
    pub fn version(&self) -> Option<String> {
        self.current().map(|m| m.version().to_string())
    }

    /// Put `model` into service, returning the one it replaced
    pub fn swap(&self, model: AnomalyModel) -> Option<Arc<AnomalyModel>> {
        let new_version = model.version().to_string();
        let incoming = Arc::new(model);
        let previous = {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, Some(incoming))
        };

        info!(
            slot = %self.slot,
            previous = previous.as_ref().map(|m| m.version()).unwrap_or("none"),
            current = %new_version,
            "Live anomaly model swapped"
        );
        previous
    }
}
