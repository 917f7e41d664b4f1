use std::backtrace::Backtrace;
use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{Classifier, Hooks, Layer, Operation};
use crate::config::LiveSwitches;
use crate::error::TelemetryError;
use crate::telemetry::{Observation, Outcome, TelemetryEvent};

pub(crate) struct Context<E> {
    pub name: Arc<str>,
    pub hooks: Hooks,
    pub classify: Classifier<E>,
}

#[derive(Clone)]
pub(crate) enum Gate {
    /// Layer was selected at composition time and always runs.
    Fixed,
    /// Layer runs only while its switch is on.
    Live(Arc<LiveSwitches>),
}

impl Gate {
    fn open(&self, layer: Layer) -> bool {
        match self {
            Gate::Fixed => true,
            Gate::Live(switches) => switches.is_enabled(layer),
        }
    }
}

fn bookkeeping(ctx_name: &str, layer: Layer, result: Result<(), TelemetryError>) {
    if let Err(e) = result {
        warn!(operation = ctx_name, ?layer, "Telemetry bookkeeping failed: {}", e);
    }
}

pub(crate) fn monitor<A, T, E>(ctx: Arc<Context<E>>, gate: Gate, next: Operation<A, T, E>) -> Operation<A, T, E>
where
    A: Debug + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    Arc::new(move |args: A| {
        if !gate.open(Layer::Monitor) {
            return next(args);
        }

        let invocation = Uuid::new_v4();
        let arguments = format!("{:?}", args);
        info!(operation = %ctx.name, %invocation, arguments = %arguments, "Monitoring before call");
        bookkeeping(
            &ctx.name,
            Layer::Monitor,
            ctx.hooks.audit.record(Observation::before(invocation, &ctx.name, &arguments)),
        );

        let result = next(args);

        let outcome = if result.is_ok() { Outcome::Succeeded } else { Outcome::Failed };
        info!(operation = %ctx.name, %invocation, ?outcome, "Monitoring after call");
        bookkeeping(
            &ctx.name,
            Layer::Monitor,
            ctx.hooks
                .audit
                .record(Observation::after(invocation, &ctx.name, &arguments, outcome)),
        );

        result
    })
}

pub(crate) fn error_capture<A, T, E>(
    ctx: Arc<Context<E>>,
    gate: Gate,
    next: Operation<A, T, E>,
) -> Operation<A, T, E>
where
    A: Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    Arc::new(move |args: A| {
        if !gate.open(Layer::ErrorCapture) {
            return next(args);
        }

        let result = next(args);
        if let Err(failure) = &result {
            let kind = (ctx.classify)(failure);
            let message = failure.to_string();
            let backtrace = Backtrace::force_capture().to_string();
            error!(operation = %ctx.name, kind = %kind, "Error occurred: {}", message);
            debug!(operation = %ctx.name, "Stack trace:\n{}", backtrace);

            bookkeeping(
                &ctx.name,
                Layer::ErrorCapture,
                ctx.hooks.errors.add(&message, &backtrace, &kind).map(|_| ()),
            );
            ctx.hooks
                .notifier
                .notify(TelemetryEvent::error(&ctx.name, &kind, &message));
        }
        result
    })
}

pub(crate) fn logging<A, T, E>(ctx: Arc<Context<E>>, gate: Gate, next: Operation<A, T, E>) -> Operation<A, T, E>
where
    A: Debug + Send + 'static,
    T: Debug + Send + 'static,
    E: Send + 'static,
{
    Arc::new(move |args: A| {
        if !gate.open(Layer::Logging) {
            return next(args);
        }

        let arguments = format!("{:?}", args);
        let result = next(args);
        // Failures belong to the error-capture layer.
        if let Ok(value) = &result {
            info!(operation = %ctx.name, arguments = %arguments, returned = ?value, "Function called");
        }
        result
    })
}

pub(crate) fn performance<A, T, E>(
    ctx: Arc<Context<E>>,
    gate: Gate,
    next: Operation<A, T, E>,
) -> Operation<A, T, E>
where
    A: Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    Arc::new(move |args: A| {
        if !gate.open(Layer::Performance) {
            return next(args);
        }

        let started = Instant::now();
        let result = next(args);
        let elapsed = started.elapsed();

        let store = &ctx.hooks.performance;
        let (recorded, error_message) = match &result {
            Ok(_) => (store.record(&ctx.name, elapsed, true), None),
            Err(failure) => {
                let message = failure.to_string();
                (store.record_failure(&ctx.name, elapsed, &message), Some(message))
            }
        };
        bookkeeping(&ctx.name, Layer::Performance, recorded);
        debug!(operation = %ctx.name, elapsed = ?elapsed, "Function executed");

        ctx.hooks
            .notifier
            .notify(TelemetryEvent::call(&ctx.name, elapsed.as_secs_f64(), error_message));
        result
    })
}
