//! Spam call detection: call-metadata rules and transcript analysis

pub mod metadata;
pub mod transcript;

pub use metadata::{CallLog, CallMetadataEvaluator, InMemoryCallLog};
pub use transcript::{Sentiment, SentimentDetector, TranscriptAnalyzer, TranscriptVerdict};
