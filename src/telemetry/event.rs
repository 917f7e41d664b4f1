use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use super::metrics::{CallSummary, OperationSummary};

// Events carry identifiers, timings and error text only. Arguments and
// results stay in the local logs and audit trail.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// One completed invocation of an instrumented operation.
    Call(CallEvent),

    /// A captured target failure.
    Error(ErrorEvent),

    PerformanceSummary {
        performance_summary: BTreeMap<String, OperationSummary>,
        timestamp: u64,
    },

    FunctionCalls {
        function_call_summary: BTreeMap<String, CallSummary>,
        timestamp: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEvent {
    pub id: Uuid,
    pub operation: String,
    /// Seconds.
    pub execution_time: f64,
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub operation: String,
    pub error_type: String,
    pub error_message: String,
    pub timestamp: u64,
}

impl TelemetryEvent {
    pub fn call(operation: &str, execution_time: f64, error_message: Option<String>) -> Self {
        TelemetryEvent::Call(CallEvent {
            id: Uuid::new_v4(),
            operation: operation.to_string(),
            execution_time,
            success: error_message.is_none(),
            error_message,
            timestamp: unix_timestamp(),
        })
    }

    pub fn error(operation: &str, error_type: &str, error_message: &str) -> Self {
        TelemetryEvent::Error(ErrorEvent {
            operation: operation.to_string(),
            error_type: error_type.to_string(),
            error_message: error_message.to_string(),
            timestamp: unix_timestamp(),
        })
    }

    pub fn operation(&self) -> Option<&str> {
        match self {
            TelemetryEvent::Call(call) => Some(&call.operation),
            TelemetryEvent::Error(err) => Some(&err.operation),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TelemetryEvent::Call(_) => "call",
            TelemetryEvent::Error(_) => "error",
            TelemetryEvent::PerformanceSummary { .. } => "performance_summary",
            TelemetryEvent::FunctionCalls { .. } => "function_calls",
        }
    }
}

pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
