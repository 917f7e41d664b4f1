use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{error, info, warn};

use super::registry::SinkHandler;
use crate::error::SinkError;
use crate::telemetry::{CallSummary, TelemetryEvent};

/// Writes every event to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl SinkHandler for LogSink {
    fn handle(&self, event: &TelemetryEvent) -> Result<(), SinkError> {
        match event {
            TelemetryEvent::Call(call) if call.success => info!(
                operation = %call.operation,
                execution_time = call.execution_time,
                "Function call"
            ),
            TelemetryEvent::Call(call) => warn!(
                operation = %call.operation,
                execution_time = call.execution_time,
                error = call.error_message.as_deref().unwrap_or(""),
                "Function call failed"
            ),
            TelemetryEvent::Error(err) => error!(
                operation = %err.operation,
                error_type = %err.error_type,
                "{}",
                err.error_message
            ),
            TelemetryEvent::PerformanceSummary { performance_summary, .. } => {
                for (operation, s) in performance_summary {
                    info!(
                        operation = %operation,
                        average = s.average,
                        max = s.max,
                        min = s.min,
                        stddev = s.stddev,
                        count = s.count,
                        "Performance"
                    );
                }
            }
            TelemetryEvent::FunctionCalls { function_call_summary, .. } => {
                for (operation, s) in function_call_summary {
                    info!(
                        operation = %operation,
                        calls = s.count,
                        errors = s.error_count,
                        avg_time = s.avg_time,
                        "Monitor summary"
                    );
                }
            }
        }
        Ok(())
    }
}

/// Aggregates call events per operation, independent of the stores.
#[derive(Debug, Default)]
pub struct CallCollector {
    calls: Mutex<BTreeMap<String, CallSummary>>,
}

impl CallCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> BTreeMap<String, CallSummary> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn get(&self, operation: &str) -> Option<CallSummary> {
        self.calls.lock().ok()?.get(operation).cloned()
    }

    pub fn reset(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

impl SinkHandler for CallCollector {
    fn handle(&self, event: &TelemetryEvent) -> Result<(), SinkError> {
        if let TelemetryEvent::Call(call) = event {
            let mut calls = self
                .calls
                .lock()
                .map_err(|_| SinkError::Handler("collector lock poisoned".to_string()))?;
            calls
                .entry(call.operation.clone())
                .or_default()
                .observe(call.execution_time, call.success);
        }
        Ok(())
    }
}
