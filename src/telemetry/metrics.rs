use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Error messages kept per operation. Older ones fall off the front.
pub const RECENT_ERRORS: usize = 32;

/// Running aggregate for one operation identifier.
///
/// Variance uses Welford's online update, so no raw samples are retained.
/// Durations are in seconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationStats {
    pub count: u64,
    pub total_secs: f64,
    pub error_count: u64,
    pub min_secs: f64,
    pub max_secs: f64,
    mean: f64,
    m2: f64,
    pub recent_errors: VecDeque<String>,
}

impl OperationStats {
    pub fn observe(&mut self, secs: f64, success: bool, message: Option<&str>) {
        self.count += 1;
        self.total_secs += secs;

        if self.count == 1 {
            self.min_secs = secs;
            self.max_secs = secs;
        } else {
            self.min_secs = self.min_secs.min(secs);
            self.max_secs = self.max_secs.max(secs);
        }

        let delta = secs - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (secs - self.mean);

        if !success {
            self.error_count += 1;
            if let Some(message) = message {
                if self.recent_errors.len() >= RECENT_ERRORS {
                    self.recent_errors.pop_front();
                }
                self.recent_errors.push_back(message.to_string());
            }
        }
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_secs / self.count as f64
        }
    }

    /// Sample standard deviation. Zero below two samples.
    pub fn stddev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / (self.count - 1) as f64).max(0.0).sqrt()
    }

    pub fn summary(&self) -> OperationSummary {
        OperationSummary {
            count: self.count,
            average: self.average(),
            min: self.min_secs,
            max: self.max_secs,
            stddev: self.stddev(),
            error_count: self.error_count,
            recent_errors: self.recent_errors.iter().cloned().collect(),
        }
    }

    pub fn call_summary(&self) -> CallSummary {
        CallSummary {
            count: self.count,
            success_count: self.count - self.error_count,
            error_count: self.error_count,
            total_time: self.total_secs,
            avg_time: self.average(),
            min_time: self.min_secs,
            max_time: self.max_secs,
        }
    }
}

/// Read-only view of one operation, as handed to dashboards and sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub count: u64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
    pub error_count: u64,
    pub recent_errors: Vec<String>,
}

/// Call accounting shipped to `/function_calls`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    pub count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_time: f64,
    pub avg_time: f64,
    pub min_time: f64,
    pub max_time: f64,
}

impl CallSummary {
    pub fn observe(&mut self, secs: f64, success: bool) {
        self.count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
        self.total_time += secs;
        if self.count == 1 {
            self.min_time = secs;
            self.max_time = secs;
        } else {
            self.min_time = self.min_time.min(secs);
            self.max_time = self.max_time.max(secs);
        }
        self.avg_time = self.total_time / self.count as f64;
    }
}

pub fn compute_summary(stats: &HashMap<String, OperationStats>) -> BTreeMap<String, OperationSummary> {
    stats
        .iter()
        .map(|(name, s)| (name.clone(), s.summary()))
        .collect()
}

pub fn compute_call_summary(stats: &HashMap<String, OperationStats>) -> BTreeMap<String, CallSummary> {
    stats
        .iter()
        .map(|(name, s)| (name.clone(), s.call_summary()))
        .collect()
}
