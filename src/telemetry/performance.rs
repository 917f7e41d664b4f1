use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{error, info};

use super::metrics::{compute_call_summary, compute_summary, CallSummary, OperationStats, OperationSummary};
use crate::error::TelemetryError;

pub type PerformanceSummary = BTreeMap<String, OperationSummary>;

/// Per-operation latency and error accounting.
#[derive(Debug, Default)]
pub struct PerformanceStore {
    stats: Mutex<HashMap<String, OperationStats>>,
}

impl PerformanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, OperationStats>>, TelemetryError> {
        self.stats
            .lock()
            .map_err(|_| TelemetryError::Poisoned("performance store"))
    }

    pub fn record(&self, operation: &str, duration: Duration, success: bool) -> Result<(), TelemetryError> {
        self.observe(operation, duration, success, None)
    }

    /// Records a failed call and keeps its message in the operation's recent errors.
    pub fn record_failure(&self, operation: &str, duration: Duration, message: &str) -> Result<(), TelemetryError> {
        self.observe(operation, duration, false, Some(message))
    }

    fn observe(
        &self,
        operation: &str,
        duration: Duration,
        success: bool,
        message: Option<&str>,
    ) -> Result<(), TelemetryError> {
        let mut stats = self.lock()?;
        stats
            .entry(operation.to_string())
            .or_default()
            .observe(duration.as_secs_f64(), success, message);
        Ok(())
    }

    pub fn summary(&self) -> Result<PerformanceSummary, TelemetryError> {
        let stats = self.lock()?;
        Ok(compute_summary(&stats))
    }

    pub fn call_summary(&self) -> Result<BTreeMap<String, CallSummary>, TelemetryError> {
        let stats = self.lock()?;
        Ok(compute_call_summary(&stats))
    }

    pub fn stats(&self, operation: &str) -> Option<OperationStats> {
        self.lock().ok()?.get(operation).cloned()
    }

    pub fn reset(&self) -> Result<&'static str, TelemetryError> {
        self.lock()?.clear();
        info!("Performance data has been reset");
        Ok("Performance data has been reset.")
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = self.stats.lock();
                    panic!("poisoning performance store");
                })
                .join()
        });
    }

    pub fn log_summary(&self) {
        let summary = match self.summary() {
            Ok(summary) => summary,
            Err(e) => {
                error!("Cannot read performance summary: {}", e);
                return;
            }
        };

        if summary.is_empty() {
            info!("No performance data available yet");
            return;
        }

        for (operation, s) in summary {
            info!(
                operation = %operation,
                average = s.average,
                max = s.max,
                min = s.min,
                stddev = s.stddev,
                count = s.count,
                errors = s.error_count,
                "Performance summary"
            );
        }
    }
}
