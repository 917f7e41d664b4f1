use std::collections::BTreeSet;
use std::fmt::{Debug, Display};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::compose::{type_kind, Classifier, Composer, Hooks, Operation};
use crate::config::{InstrumentationConfig, LiveSwitches};
use crate::plugin::{spawn_dispatcher, Notifier, PluginRegistry};
use crate::telemetry::event::unix_timestamp;
use crate::telemetry::{
    CallAudit, ErrorStore, ErrorSummary, PerformanceStore, PerformanceSummary, TelemetryEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    Performance,
    Errors,
    All,
}

/// Process-wide instrumentation state.
///
/// Construct once at startup and pass it (or an `Arc` of it) to the code
/// that wraps operations. Tests build a fresh one per case.
pub struct Instrumentation {
    config: InstrumentationConfig,
    registry: Arc<PluginRegistry>,
    composer: Composer,
    operations: Mutex<BTreeSet<String>>,
}

impl Instrumentation {
    /// Sinks are notified inline on the calling thread.
    pub fn new(config: InstrumentationConfig) -> Self {
        let registry = Arc::new(PluginRegistry::new());
        let notifier = Notifier::Inline(registry.clone());
        Self::assemble(config, registry, notifier)
    }

    /// Sinks are notified from a background task fed by a bounded queue.
    /// Must be called inside a tokio runtime.
    pub fn queued(config: InstrumentationConfig, capacity: usize, token: CancellationToken) -> (Self, JoinHandle<()>) {
        let registry = Arc::new(PluginRegistry::new());
        let (notifier, handle) = spawn_dispatcher(registry.clone(), capacity, token);
        (Self::assemble(config, registry, notifier), handle)
    }

    fn assemble(config: InstrumentationConfig, registry: Arc<PluginRegistry>, notifier: Notifier) -> Self {
        let hooks = Hooks {
            notifier,
            ..Hooks::default()
        };
        Self {
            config,
            registry,
            composer: Composer::new(hooks),
            operations: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn config(&self) -> &InstrumentationConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn performance(&self) -> &Arc<PerformanceStore> {
        &self.composer.hooks().performance
    }

    pub fn errors(&self) -> &Arc<ErrorStore> {
        &self.composer.hooks().errors
    }

    pub fn audit(&self) -> &Arc<CallAudit> {
        &self.composer.hooks().audit
    }

    fn remember(&self, name: &str) {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
    }

    /// Every operation wrapped through this instance, sorted.
    pub fn operations(&self) -> Vec<String> {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Wraps `target` with the layers enabled in the configuration.
    ///
    /// Failures are classified by the short type name of `E` (see
    /// [`type_kind`]). Use [`Instrumentation::wrap_classified`] when variants
    /// or boxed errors need distinct kinds.
    pub fn wrap<A, T, E, F>(&self, name: &str, target: F) -> Operation<A, T, E>
    where
        A: Debug + Send + 'static,
        T: Debug + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        self.wrap_classified(name, Arc::new(|_: &E| type_kind::<E>()), target)
    }

    pub fn wrap_classified<A, T, E, F>(&self, name: &str, classify: Classifier<E>, target: F) -> Operation<A, T, E>
    where
        A: Debug + Send + 'static,
        T: Debug + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        self.remember(name);
        self.composer
            .compose_classified(name, &self.config.layers(), classify, target)
    }

    /// Wraps `target` with all layers gated by `switches` at call time.
    pub fn wrap_live<A, T, E, F>(&self, name: &str, switches: Arc<LiveSwitches>, target: F) -> Operation<A, T, E>
    where
        A: Debug + Send + 'static,
        T: Debug + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        self.remember(name);
        self.composer
            .compose_live(name, switches, Arc::new(|_: &E| type_kind::<E>()), target)
    }

    /// Empty when the store cannot be read; the failure is logged.
    pub fn performance_summary(&self) -> PerformanceSummary {
        self.performance().summary().unwrap_or_else(|e| {
            error!("Cannot read performance summary: {}", e);
            PerformanceSummary::new()
        })
    }

    pub fn error_summary(&self) -> ErrorSummary {
        self.errors().summary().unwrap_or_else(|e| {
            error!("Cannot read error summary: {}", e);
            ErrorSummary::default()
        })
    }

    /// Clears the selected stores and returns a confirmation line.
    pub fn reset(&self, scope: ResetScope) -> String {
        let mut confirmations = Vec::new();
        if matches!(scope, ResetScope::Performance | ResetScope::All) {
            match self.performance().reset() {
                Ok(msg) => confirmations.push(msg.to_string()),
                Err(e) => confirmations.push(format!("Performance reset failed: {}", e)),
            }
        }
        if matches!(scope, ResetScope::Errors | ResetScope::All) {
            match self.errors().reset() {
                Ok(msg) => confirmations.push(msg.to_string()),
                Err(e) => confirmations.push(format!("Error reset failed: {}", e)),
            }
        }
        confirmations.join(" ")
    }

    pub fn log_performance_summary(&self) {
        self.performance().log_summary();
    }

    /// Sends the current performance and call summaries to the sinks.
    pub fn publish_summary(&self) {
        let performance_summary = self.performance_summary();
        let function_call_summary = match self.performance().call_summary() {
            Ok(summary) => summary,
            Err(e) => {
                error!("Cannot read call summary: {}", e);
                return;
            }
        };
        let timestamp = unix_timestamp();
        let notifier = &self.composer.hooks().notifier;
        notifier.notify(TelemetryEvent::PerformanceSummary {
            performance_summary,
            timestamp,
        });
        notifier.notify(TelemetryEvent::FunctionCalls {
            function_call_summary,
            timestamp,
        });
    }

    /// Logs and publishes the summary every `performance_logging_interval`
    /// seconds until `token` is cancelled.
    pub fn spawn_reporter(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let period = this.config.reporting_interval();

        tokio::spawn(async move {
            let mut cadence = interval(period);
            cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately.
            cadence.tick().await;
            info!(?period, "Performance reporter started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = cadence.tick() => {
                        this.log_performance_summary();
                        this.publish_summary();
                    }
                }
            }
            info!("Performance reporter stopped");
        })
    }
}
