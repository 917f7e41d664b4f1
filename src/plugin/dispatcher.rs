use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::PluginRegistry;
use crate::telemetry::TelemetryEvent;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// How instrumentation layers hand events to the sinks.
#[derive(Clone, Default)]
pub enum Notifier {
    /// Drop events. For compositions without sinks.
    #[default]
    Silent,
    /// Broadcast on the calling thread, after the store update committed.
    Inline(Arc<PluginRegistry>),
    /// Push onto a bounded queue drained by a background task.
    Queued(mpsc::Sender<TelemetryEvent>),
}

impl Notifier {
    /// Never blocks on a full queue and never fails the caller.
    pub fn notify(&self, event: TelemetryEvent) {
        match self {
            Notifier::Silent => {}
            Notifier::Inline(registry) => {
                registry.broadcast(&event);
            }
            Notifier::Queued(tx) => {
                if let Err(e) = tx.try_send(event) {
                    let (reason, event) = match e {
                        mpsc::error::TrySendError::Full(ev) => ("queue full", ev),
                        mpsc::error::TrySendError::Closed(ev) => ("dispatcher stopped", ev),
                    };
                    warn!(event = event.label(), reason, "Dropped telemetry event");
                }
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notifier::Silent => f.write_str("Notifier::Silent"),
            Notifier::Inline(_) => f.write_str("Notifier::Inline"),
            Notifier::Queued(_) => f.write_str("Notifier::Queued"),
        }
    }
}

/// Starts the background broadcaster. Must be called inside a tokio runtime.
///
/// On cancellation the task drains what is already queued, then exits.
pub fn spawn_dispatcher(
    registry: Arc<PluginRegistry>,
    capacity: usize,
    token: CancellationToken,
) -> (Notifier, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<TelemetryEvent>(capacity.max(1));

    let handle = tokio::spawn(async move {
        info!(capacity, "Telemetry dispatcher started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                next = rx.recv() => match next {
                    Some(event) => {
                        registry.broadcast(&event);
                    }
                    None => break,
                },
            }
        }

        rx.close();
        let mut drained = 0usize;
        while let Ok(event) = rx.try_recv() {
            registry.broadcast(&event);
            drained += 1;
        }
        debug!(drained, "Telemetry dispatcher drained queue");
        info!("Telemetry dispatcher stopped");
    });

    (Notifier::Queued(tx), handle)
}
