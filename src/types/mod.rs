//! Type definitions for the decision and retraining engine

pub mod alert;
pub mod call;
pub mod feedback;
pub mod transaction;

pub use alert::{FraudAlert, RiskLevel, SpamVerdict};
pub use call::{CallEvent, CallMetadata, CallRecord};
pub use feedback::{FeedbackEntry, FeedbackSubmission, FeedbackSummary};
pub use transaction::TransactionRecord;
