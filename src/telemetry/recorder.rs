use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::event::unix_timestamp;
use crate::error::TelemetryError;

const MAX_OBSERVATIONS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Pending,
    Succeeded,
    Failed,
}

/// One monitor-layer observation. `Before` and `After` share an invocation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub invocation: Uuid,
    pub operation: String,
    pub phase: Phase,
    pub arguments: String,
    pub outcome: Outcome,
    pub timestamp: u64,
}

impl Observation {
    pub fn before(invocation: Uuid, operation: &str, arguments: &str) -> Self {
        Self {
            invocation,
            operation: operation.to_string(),
            phase: Phase::Before,
            arguments: arguments.to_string(),
            outcome: Outcome::Pending,
            timestamp: unix_timestamp(),
        }
    }

    pub fn after(invocation: Uuid, operation: &str, arguments: &str, outcome: Outcome) -> Self {
        Self {
            phase: Phase::After,
            outcome,
            ..Self::before(invocation, operation, arguments)
        }
    }
}

/// Call-sequence audit trail written by the monitor layer.
#[derive(Debug)]
pub struct CallAudit {
    buffer: Mutex<VecDeque<Observation>>,
}

impl Default for CallAudit {
    fn default() -> Self {
        Self::new()
    }
}

impl CallAudit {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(1024)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<Observation>>, TelemetryError> {
        self.buffer.lock().map_err(|_| TelemetryError::Poisoned("call audit"))
    }

    pub fn record(&self, observation: Observation) -> Result<(), TelemetryError> {
        let mut buffer = self.lock()?;
        if buffer.len() >= MAX_OBSERVATIONS {
            buffer.pop_front();
        }
        buffer.push_back(observation);
        Ok(())
    }

    pub fn snapshot(&self) -> Result<Vec<Observation>, TelemetryError> {
        Ok(self.lock()?.iter().cloned().collect())
    }

    pub fn for_operation(&self, operation: &str) -> Result<Vec<Observation>, TelemetryError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|o| o.operation == operation)
            .cloned()
            .collect())
    }

    pub fn clear(&self) -> Result<(), TelemetryError> {
        self.lock()?.clear();
        Ok(())
    }
}
