//! Rule chain over call metadata.
//!
//! All rules run on every call so several reasons can be reported together.

use crate::config::CallRulesConfig;
use crate::error::{EngineError, Result};
use crate::types::alert::SpamVerdict;
use crate::types::call::{CallMetadata, CallRecord};
use chrono::{Duration, NaiveDateTime};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

pub const REASON_BLACKLISTED: &str = "Caller is in the blacklist.";
pub const REASON_SHORT_CALL: &str = "Call duration is below the threshold.";
pub const REASON_FREQUENCY: &str = "Caller exceeded the allowed call frequency.";

/// Number of rules in the chain
pub const RULE_COUNT: usize = 3;

/// History of prior calls
pub trait CallLog: Send + Sync {
    /// Calls from `caller_id` at or after `since`
    fn recent_calls(&self, caller_id: &str, since: NaiveDateTime) -> Vec<CallRecord>;
}

/// Call log kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryCallLog {
    calls: RwLock<Vec<CallRecord>>,
    high_water: RwLock<Option<NaiveDateTime>>,
}

impl InMemoryCallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the log with existing records
    pub fn with_calls(calls: Vec<CallRecord>) -> Self {
        Self {
            calls: RwLock::new(calls),
            high_water: RwLock::new(None),
        }
    }

    pub fn record(&self, call: CallRecord) {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Advance the newest trusted call time to `timestamp` unless it lies
    /// ahead of `now`, returning the mark afterwards
    pub fn advance_high_water(&self, timestamp: NaiveDateTime, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut mark = self.high_water.write().unwrap_or_else(PoisonError::into_inner);
        if timestamp <= now && mark.map_or(true, |m| timestamp > m) {
            *mark = Some(timestamp);
        }
        *mark
    }

    /// Drop records older than `cutoff`
    pub fn prune_before(&self, cutoff: NaiveDateTime) {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|c| c.timestamp >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.calls.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CallLog for InMemoryCallLog {
    fn recent_calls(&self, caller_id: &str, since: NaiveDateTime) -> Vec<CallRecord> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.caller_id == caller_id && c.timestamp >= since)
            .cloned()
            .collect()
    }
}

/// Evaluates the blacklist, duration and frequency rules
pub struct CallMetadataEvaluator {
    blacklist: HashSet<String>,
    min_duration_secs: u64,
    max_calls_per_window: usize,
    window: Duration,
    timestamp_format: String,
    call_log: Arc<dyn CallLog>,
}

impl CallMetadataEvaluator {
    pub fn new(config: &CallRulesConfig, call_log: Arc<dyn CallLog>) -> Self {
        Self {
            blacklist: config.blacklist.iter().cloned().collect(),
            min_duration_secs: config.min_duration_secs,
            max_calls_per_window: config.max_calls_per_window,
            window: Duration::seconds(config.window_secs),
            timestamp_format: config.timestamp_format.clone(),
            call_log,
        }
    }

    /// Parse a call timestamp in the configured format
    pub fn parse_timestamp(&self, value: &str) -> Result<NaiveDateTime> {
        NaiveDateTime::parse_from_str(value.trim(), &self.timestamp_format).map_err(|_| {
            EngineError::MalformedTimestamp {
                value: value.to_string(),
                format: self.timestamp_format.clone(),
            }
        })
    }

    /// Run every rule against one call
    pub fn evaluate(&self, call: &CallMetadata) -> Result<SpamVerdict> {
        let call_time = self.parse_timestamp(&call.call_timestamp)?;
        let mut verdict = SpamVerdict::clean();

        if self.blacklist.contains(&call.caller_id) {
            verdict.flag(REASON_BLACKLISTED);
        }

        if call.call_duration < self.min_duration_secs {
            verdict.flag(REASON_SHORT_CALL);
        }

        let prior_calls = self.calls_in_window(&call.caller_id, call_time);
        if prior_calls >= self.max_calls_per_window {
            verdict.flag(REASON_FREQUENCY);
        }

        debug!(
            caller_id = %call.caller_id,
            is_spam = verdict.is_spam,
            prior_calls = prior_calls,
            reasons = ?verdict.reasons,
            "Call metadata evaluated"
        );

        Ok(verdict)
    }

    /// Prior calls with `call_time - window <= ts < call_time`
    fn calls_in_window(&self, caller_id: &str, call_time: NaiveDateTime) -> usize {
        let since = call_time - self.window;
        self.call_log
            .recent_calls(caller_id, since)
            .iter()
            .filter(|c| c.caller_id == caller_id && c.timestamp >= since && c.timestamp < call_time)
            .count()
    }
}
