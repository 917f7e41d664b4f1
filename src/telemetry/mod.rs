//! Telemetry stores shared by every instrumented operation.
//!
//! # CONCURRENCY INVARIANT
//! Each store guards its whole state behind a single lock. A `record`/`add`
//! is visible in full or not at all, and `summary()` is a point-in-time copy.
//! No store lock is ever held while a sink is notified.
//!
//! # GROWTH
//! Performance stats are O(1) per operation (online accumulator).
//! Error records and audit observations are ring buffers; see `errors` and `recorder`.

pub mod errors;
pub mod event;
pub mod metrics;
pub mod performance;
pub mod recorder;

pub use errors::{ErrorRecord, ErrorStore, ErrorSummary};
pub use event::{CallEvent, ErrorEvent, TelemetryEvent};
pub use metrics::{CallSummary, OperationStats, OperationSummary};
pub use performance::{PerformanceStore, PerformanceSummary};
pub use recorder::{CallAudit, Observation, Outcome, Phase};
