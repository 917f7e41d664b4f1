//! Named telemetry sinks with failure isolation.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{RegistryError, SinkError};
use crate::telemetry::TelemetryEvent;

/// Consumer of telemetry events.
///
/// Errors and panics raised by a handler are caught by the registry and never
/// reach the instrumented caller or other sinks.
pub trait SinkHandler: Send + Sync {
    fn handle(&self, event: &TelemetryEvent) -> Result<(), SinkError>;
}

impl<F> SinkHandler for F
where
    F: Fn(&TelemetryEvent) -> Result<(), SinkError> + Send + Sync,
{
    fn handle(&self, event: &TelemetryEvent) -> Result<(), SinkError> {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Loaded,
    Unloaded,
}

#[derive(Clone)]
pub struct SinkRegistration {
    pub name: String,
    pub handler: Arc<dyn SinkHandler>,
    pub state: SinkState,
}

impl std::fmt::Debug for SinkRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkRegistration")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Failed(SinkError),
    Unloaded,
    Missing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<String>,
    pub skipped: Vec<String>,
    pub failures: Vec<(String, SinkError)>,
}

impl BroadcastReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Registry of sinks keyed by unique name.
///
/// Handlers run outside the registry lock, so a slow or re-entrant sink
/// cannot block registration changes.
#[derive(Default)]
pub struct PluginRegistry {
    sinks: RwLock<HashMap<String, SinkRegistration>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&self, name: &str, handler: H) -> Result<(), RegistryError>
    where
        H: SinkHandler + 'static,
    {
        self.register_shared(name, Arc::new(handler))
    }

    pub fn register_shared(&self, name: &str, handler: Arc<dyn SinkHandler>) -> Result<(), RegistryError> {
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        if sinks.contains_key(name) {
            warn!(sink = name, "Rejected duplicate sink registration");
            return Err(RegistryError::DuplicateSink(name.to_string()));
        }
        sinks.insert(
            name.to_string(),
            SinkRegistration {
                name: name.to_string(),
                handler,
                state: SinkState::Loaded,
            },
        );
        info!(sink = name, "Sink registered");
        Ok(())
    }

    /// Removes a sink. Returns whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self
            .sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            info!(sink = name, "Sink unregistered");
        } else {
            warn!(sink = name, "Cannot unregister unknown sink");
        }
        removed
    }

    pub fn unload(&self, name: &str) -> Result<(), RegistryError> {
        self.set_state(name, SinkState::Unloaded)
    }

    pub fn load(&self, name: &str) -> Result<(), RegistryError> {
        self.set_state(name, SinkState::Loaded)
    }

    fn set_state(&self, name: &str, state: SinkState) -> Result<(), RegistryError> {
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        match sinks.get_mut(name) {
            Some(registration) => {
                registration.state = state;
                info!(sink = name, ?state, "Sink state changed");
                Ok(())
            }
            None => {
                warn!(sink = name, "Sink is not registered");
                Err(RegistryError::UnknownSink(name.to_string()))
            }
        }
    }

    pub fn state(&self, name: &str) -> Option<SinkState> {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|r| r.state)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state(name).is_some()
    }

    /// Sink names with their state, sorted by name.
    pub fn list(&self) -> Vec<(String, SinkState)> {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        let mut listed: Vec<_> = sinks.values().map(|r| (r.name.clone(), r.state)).collect();
        listed.sort_by(|a, b| a.0.cmp(&b.0));
        listed
    }

    pub fn dispatch(&self, name: &str, event: &TelemetryEvent) -> DispatchOutcome {
        let registration = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();

        match registration {
            None => {
                warn!(sink = name, "No sink registered under this name");
                DispatchOutcome::Missing
            }
            Some(r) if r.state == SinkState::Unloaded => DispatchOutcome::Unloaded,
            Some(r) => match invoke(&r.name, r.handler.as_ref(), event) {
                Ok(()) => DispatchOutcome::Delivered,
                Err(e) => DispatchOutcome::Failed(e),
            },
        }
    }

    /// Delivers to every loaded sink. A failing sink does not stop the others.
    pub fn broadcast(&self, event: &TelemetryEvent) -> BroadcastReport {
        let targets: Vec<SinkRegistration> = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut report = BroadcastReport::default();
        for registration in targets {
            if registration.state == SinkState::Unloaded {
                report.skipped.push(registration.name);
                continue;
            }
            match invoke(&registration.name, registration.handler.as_ref(), event) {
                Ok(()) => report.delivered.push(registration.name),
                Err(e) => report.failures.push((registration.name, e)),
            }
        }

        if !report.is_clean() {
            warn!(
                event = event.label(),
                failed = report.failures.len(),
                delivered = report.delivered.len(),
                "Broadcast completed with sink failures"
            );
        }
        report
    }
}

fn invoke(name: &str, handler: &dyn SinkHandler, event: &TelemetryEvent) -> Result<(), SinkError> {
    let result = match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
        Ok(result) => result,
        Err(payload) => Err(SinkError::Panicked(panic_message(payload.as_ref()))),
    };

    match &result {
        Ok(()) => debug!(sink = name, event = event.label(), "Sink handled event"),
        Err(e) => error!(sink = name, event = event.label(), "Error executing sink handler: {}", e),
    }
    result
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
