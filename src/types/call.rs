//! Call events evaluated by the spam rules

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Metadata of one inbound call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMetadata {
    pub caller_id: String,
    pub receiver_id: String,
    /// Duration in seconds
    #[serde(default)]
    pub call_duration: u64,
    /// Local call time, e.g. "2025-01-20 10:15:00"
    pub call_timestamp: String,
}

impl CallMetadata {
    pub fn new(
        caller_id: impl Into<String>,
        receiver_id: impl Into<String>,
        call_duration: u64,
        call_timestamp: impl Into<String>,
    ) -> Self {
        Self {
            caller_id: caller_id.into(),
            receiver_id: receiver_id.into(),
            call_duration,
            call_timestamp: call_timestamp.into(),
        }
    }
}

/// A prior call as returned by a call log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub caller_id: String,
    pub timestamp: NaiveDateTime,
}

/// Call event as received from the telephony side, optionally with a transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEvent {
    #[serde(flatten)]
    pub metadata: CallMetadata,
    #[serde(default)]
    pub transcript: Option<String>,
}
