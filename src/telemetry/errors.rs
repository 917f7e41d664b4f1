use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use super::event::unix_timestamp;
use crate::error::TelemetryError;

pub const DEFAULT_ERROR_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub backtrace: String,
    pub kind: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub general: Vec<ErrorRecord>,
    #[serde(rename = "byKind")]
    pub by_kind: BTreeMap<String, Vec<ErrorRecord>>,
}

#[derive(Debug, Default)]
struct ErrorIndex {
    general: VecDeque<ErrorRecord>,
    by_kind: HashMap<String, VecDeque<ErrorRecord>>,
}

/// Captured failures, indexed both chronologically and by kind.
///
/// Both indexes live under one lock so a record is never visible in one and
/// missing from the other. When a capacity is set the oldest record is
/// evicted from both indexes together.
#[derive(Debug)]
pub struct ErrorStore {
    index: Mutex<ErrorIndex>,
    capacity: Option<usize>,
}

impl Default for ErrorStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ERROR_CAPACITY)
    }
}

impl ErrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: Mutex::new(ErrorIndex::default()),
            capacity: Some(capacity.max(1)),
        }
    }

    /// Grows until `reset`. Only for short-lived processes.
    pub fn unbounded() -> Self {
        Self {
            index: Mutex::new(ErrorIndex::default()),
            capacity: None,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ErrorIndex>, TelemetryError> {
        self.index.lock().map_err(|_| TelemetryError::Poisoned("error store"))
    }

    pub fn add(&self, message: &str, backtrace: &str, kind: &str) -> Result<ErrorRecord, TelemetryError> {
        let record = ErrorRecord {
            message: message.to_string(),
            backtrace: backtrace.to_string(),
            kind: kind.to_string(),
            timestamp: unix_timestamp(),
        };

        let mut index = self.lock()?;
        if let Some(capacity) = self.capacity {
            while index.general.len() >= capacity {
                let Some(oldest) = index.general.pop_front() else { break };
                let emptied = match index.by_kind.get_mut(&oldest.kind) {
                    Some(bucket) => {
                        bucket.pop_front();
                        bucket.is_empty()
                    }
                    None => false,
                };
                if emptied {
                    index.by_kind.remove(&oldest.kind);
                }
            }
        }
        index.general.push_back(record.clone());
        index
            .by_kind
            .entry(record.kind.clone())
            .or_default()
            .push_back(record.clone());

        Ok(record)
    }

    pub fn summary(&self) -> Result<ErrorSummary, TelemetryError> {
        let index = self.lock()?;
        Ok(ErrorSummary {
            general: index.general.iter().cloned().collect(),
            by_kind: index
                .by_kind
                .iter()
                .map(|(kind, records)| (kind.clone(), records.iter().cloned().collect()))
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().map(|index| index.general.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) -> Result<&'static str, TelemetryError> {
        let mut index = self.lock()?;
        index.general.clear();
        index.by_kind.clear();
        info!("Error data has been reset");
        Ok("Error data has been reset.")
    }
}
