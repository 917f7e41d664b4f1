//! Builds instrumented operations from a target and an ordered layer list.
//!
//! # NESTING ORDER (outermost first)
//! `Monitor -> ErrorCapture -> Logging -> Performance -> target`
//!
//! Monitor sees every call, including failing ones, before error capture
//! records them. Performance sits next to the target and times it on both
//! success and failure.
//!
//! # TRANSPARENCY INVARIANT
//! The wrapped operation returns exactly what the target returned. Layer
//! bookkeeping failures are logged and swallowed.

mod layers;

use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::config::LiveSwitches;
use crate::plugin::Notifier;
use crate::telemetry::{CallAudit, ErrorStore, PerformanceStore};

use layers::{Context, Gate};

/// A callable with the target's signature. Multiple arguments travel as a tuple.
pub type Operation<A, T, E> = Arc<dyn Fn(A) -> Result<T, E> + Send + Sync>;

/// Maps a failure to its error kind.
pub type Classifier<E> = Arc<dyn Fn(&E) -> String + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Monitor,
    ErrorCapture,
    Logging,
    Performance,
}

impl Layer {
    /// Fixed nesting order, outermost first.
    pub const ORDER: [Layer; 4] = [Layer::Monitor, Layer::ErrorCapture, Layer::Logging, Layer::Performance];

    fn rank(self) -> usize {
        Layer::ORDER
            .iter()
            .position(|layer| *layer == self)
            .unwrap_or(Layer::ORDER.len())
    }
}

/// Shared stores and the sink notifier every layer writes to.
#[derive(Debug, Clone, Default)]
pub struct Hooks {
    pub performance: Arc<PerformanceStore>,
    pub errors: Arc<ErrorStore>,
    pub audit: Arc<CallAudit>,
    pub notifier: Notifier,
}

/// Short type name of `E`, used as the default error kind.
///
/// Every variant of an enum shares this kind, and erased error types collapse
/// to their wrapper (`Box<dyn Error>` gives `"Box"`, `anyhow::Error` gives
/// `"Error"`). Pass a classifier to `compose_classified` to split them.
pub fn type_kind<E>() -> String {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

#[derive(Debug, Clone, Default)]
pub struct Composer {
    hooks: Hooks,
}

impl Composer {
    pub fn new(hooks: Hooks) -> Self {
        Self { hooks }
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Wraps `target` in the given layers. Layers absent from the list are not
    /// built at all. Order in `layers` is irrelevant; duplicates are ignored.
    pub fn compose<A, T, E, F>(&self, name: &str, layers: &[Layer], target: F) -> Operation<A, T, E>
    where
        A: Debug + Send + 'static,
        T: Debug + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        self.compose_classified(name, layers, Arc::new(|_: &E| type_kind::<E>()), target)
    }

    pub fn compose_classified<A, T, E, F>(
        &self,
        name: &str,
        layers: &[Layer],
        classify: Classifier<E>,
        target: F,
    ) -> Operation<A, T, E>
    where
        A: Debug + Send + 'static,
        T: Debug + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        let mut ordered: Vec<Layer> = layers.to_vec();
        ordered.sort_by_key(|l| l.rank());
        ordered.dedup();
        self.build(name, &ordered, Gate::Fixed, classify, target)
    }

    /// Builds all four layers; each consults `switches` on every call, so
    /// toggling takes effect without recomposing.
    pub fn compose_live<A, T, E, F>(
        &self,
        name: &str,
        switches: Arc<LiveSwitches>,
        classify: Classifier<E>,
        target: F,
    ) -> Operation<A, T, E>
    where
        A: Debug + Send + 'static,
        T: Debug + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        self.build(name, &Layer::ORDER, Gate::Live(switches), classify, target)
    }

    fn build<A, T, E, F>(
        &self,
        name: &str,
        ordered: &[Layer],
        gate: Gate,
        classify: Classifier<E>,
        target: F,
    ) -> Operation<A, T, E>
    where
        A: Debug + Send + 'static,
        T: Debug + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        let ctx = Arc::new(Context {
            name: Arc::from(name),
            hooks: self.hooks.clone(),
            classify,
        });

        // Wrap innermost first so the first layer in `ordered` ends up outside.
        let mut op: Operation<A, T, E> = Arc::new(target);
        for layer in ordered.iter().rev() {
            op = match layer {
                Layer::Performance => layers::performance(ctx.clone(), gate.clone(), op),
                Layer::Logging => layers::logging(ctx.clone(), gate.clone(), op),
                Layer::ErrorCapture => layers::error_capture(ctx.clone(), gate.clone(), op),
                Layer::Monitor => layers::monitor(ctx.clone(), gate.clone(), op),
            };
        }
        op
    }
}
