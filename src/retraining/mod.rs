//! Retraining: trigger policy, job state machine, training backends and the
//! orchestrator that swaps new models into service

pub mod backend;
pub mod job;
pub mod orchestrator;
pub mod policy;
pub mod retry;
pub mod source;

pub use backend::{LocalTrainingBackend, TrainingBackend};
pub use job::{JobState, RetrainingJob};
pub use orchestrator::{RetrainingDeps, RetrainingOrchestrator};
pub use policy::{RetrainPolicy, TriggerReason};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use source::{InMemoryTransactionSource, TransactionSource};
