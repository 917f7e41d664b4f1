//! Remote delivery of telemetry. Failures here stay here: they are logged,
//! reported to the registry as sink failures, and never reach the caller
//! of an instrumented operation.

pub mod client;
pub mod monitor;

pub use client::{Delivery, ExternalSinkClient, RetryPolicy, SinkClientConfig, RETRYABLE_STATUS};
pub use monitor::{route, ExternalMonitorSink};
