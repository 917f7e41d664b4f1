use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::client::ExternalSinkClient;
use crate::error::SinkError;
use crate::plugin::SinkHandler;
use crate::telemetry::TelemetryEvent;

pub const METRICS_PATH: &str = "";
pub const ERRORS_PATH: &str = "/errors";
pub const PERFORMANCE_SUMMARY_PATH: &str = "/performance_summary";
pub const FUNCTION_CALLS_PATH: &str = "/function_calls";

/// Endpoint suffix and JSON body for an event.
pub fn route(event: &TelemetryEvent) -> Result<(&'static str, Value), serde_json::Error> {
    let routed = match event {
        // Receivers key call metrics by `func_name`; the event id stays local.
        TelemetryEvent::Call(call) => (
            METRICS_PATH,
            json!({
                "func_name": call.operation,
                "execution_time": call.execution_time,
                "success": call.success,
                "error_message": call.error_message,
                "timestamp": call.timestamp,
            }),
        ),
        TelemetryEvent::Error(err) => (ERRORS_PATH, serde_json::to_value(err)?),
        TelemetryEvent::PerformanceSummary {
            performance_summary,
            timestamp,
        } => (
            PERFORMANCE_SUMMARY_PATH,
            json!({ "performance_summary": performance_summary, "timestamp": timestamp }),
        ),
        TelemetryEvent::FunctionCalls {
            function_call_summary,
            timestamp,
        } => (
            FUNCTION_CALLS_PATH,
            json!({ "function_call_summary": function_call_summary, "timestamp": timestamp }),
        ),
    };
    Ok(routed)
}

/// Sink that forwards events to a remote monitor.
///
/// `handle` only enqueues; delivery and retries run on a separate task so a
/// slow endpoint never stalls the registry.
#[derive(Clone)]
pub struct ExternalMonitorSink {
    tx: mpsc::Sender<TelemetryEvent>,
}

impl ExternalMonitorSink {
    /// Must be called inside a tokio runtime. The task ends once every clone
    /// of the sink is dropped and the queue is empty.
    pub fn spawn(client: ExternalSinkClient, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<TelemetryEvent>(capacity.max(1));

        let handle = tokio::spawn(async move {
            info!(url = %client.url_for(""), "External monitor forwarding started");
            while let Some(event) = rx.recv().await {
                let (path, payload) = match route(&event) {
                    Ok(routed) => routed,
                    Err(e) => {
                        warn!(event = event.label(), "Cannot encode telemetry event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = client.send(path, payload).await {
                    warn!(event = event.label(), "Dropped telemetry event: {}", e);
                }
            }
            info!("External monitor forwarding stopped");
        });

        (Self { tx }, handle)
    }
}

impl SinkHandler for ExternalMonitorSink {
    fn handle(&self, event: &TelemetryEvent) -> Result<(), SinkError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}
