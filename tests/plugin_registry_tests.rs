use callscope::error::{RegistryError, SinkError};
use callscope::plugin::{
    spawn_dispatcher, CallCollector, DispatchOutcome, LogSink, PluginRegistry, SinkState,
};
use callscope::telemetry::TelemetryEvent;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn call_event(operation: &str, ok: bool) -> TelemetryEvent {
    let error = if ok { None } else { Some("boom".to_string()) };
    TelemetryEvent::call(operation, 0.25, error)
}

fn counting_sink(counter: Arc<AtomicUsize>) -> impl Fn(&TelemetryEvent) -> Result<(), SinkError> + Send + Sync {
    move |_: &TelemetryEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let registry = PluginRegistry::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    registry.register("metrics", counting_sink(first.clone())).unwrap();
    let err = registry.register("metrics", counting_sink(second.clone())).unwrap_err();
    assert_eq!(err, RegistryError::DuplicateSink("metrics".to_string()));

    // The first handler is still the one in place.
    assert_eq!(registry.dispatch("metrics", &call_event("op", true)), DispatchOutcome::Delivered);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unregister_unknown_is_noop() {
    let registry = PluginRegistry::new();
    assert!(!registry.unregister("ghost"));

    registry.register("log", LogSink).unwrap();
    assert!(registry.unregister("log"));
    assert!(!registry.contains("log"));
    assert_eq!(registry.dispatch("log", &call_event("op", true)), DispatchOutcome::Missing);
}

#[test]
fn test_dispatch_contains_handler_errors_and_panics() {
    let registry = PluginRegistry::new();
    registry
        .register("failing", |_: &TelemetryEvent| -> Result<(), SinkError> {
            Err(SinkError::Status(503))
        })
        .unwrap();
    registry
        .register("panicking", |_: &TelemetryEvent| -> Result<(), SinkError> { panic!("handler bug") })
        .unwrap();

    let event = call_event("op", false);
    assert_eq!(
        registry.dispatch("failing", &event),
        DispatchOutcome::Failed(SinkError::Status(503))
    );
    assert_eq!(
        registry.dispatch("panicking", &event),
        DispatchOutcome::Failed(SinkError::Panicked("handler bug".to_string()))
    );
}

#[test]
fn test_broadcast_reaches_every_sink_despite_failures() {
    let registry = PluginRegistry::new();
    let healthy = Arc::new(AtomicUsize::new(0));
    let collector = Arc::new(CallCollector::new());

    registry
        .register("a_failing", |_: &TelemetryEvent| -> Result<(), SinkError> {
            Err(SinkError::Handler("down".to_string()))
        })
        .unwrap();
    registry
        .register("b_panicking", |_: &TelemetryEvent| -> Result<(), SinkError> { panic!("oops") })
        .unwrap();
    registry.register("c_healthy", counting_sink(healthy.clone())).unwrap();
    registry.register_shared("d_collector", collector.clone()).unwrap();

    let report = registry.broadcast(&call_event("op", true));
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.delivered.len(), 2);
    assert!(!report.is_clean());
    assert_eq!(healthy.load(Ordering::SeqCst), 1);
    assert_eq!(collector.get("op").unwrap().count, 1);
}

#[test]
fn test_unloaded_sinks_are_skipped_until_reloaded() {
    let registry = PluginRegistry::new();
    let counter = Arc::new(AtomicUsize::new(0));
    registry.register("metrics", counting_sink(counter.clone())).unwrap();

    registry.unload("metrics").unwrap();
    assert_eq!(registry.state("metrics"), Some(SinkState::Unloaded));
    assert_eq!(registry.dispatch("metrics", &call_event("op", true)), DispatchOutcome::Unloaded);
    let report = registry.broadcast(&call_event("op", true));
    assert_eq!(report.skipped, vec!["metrics".to_string()]);
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    registry.load("metrics").unwrap();
    registry.broadcast(&call_event("op", true));
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    assert_eq!(
        registry.unload("ghost"),
        Err(RegistryError::UnknownSink("ghost".to_string()))
    );
}

#[test]
fn test_list_is_sorted_with_states() {
    let registry = PluginRegistry::new();
    registry.register("zeta", LogSink).unwrap();
    registry.register("alpha", LogSink).unwrap();
    registry.unload("zeta").unwrap();

    assert_eq!(
        registry.list(),
        vec![
            ("alpha".to_string(), SinkState::Loaded),
            ("zeta".to_string(), SinkState::Unloaded),
        ]
    );
}

#[test]
fn test_collector_aggregates_calls() {
    let collector = CallCollector::new();
    let registry = PluginRegistry::new();
    let collector = Arc::new(collector);
    registry.register_shared("collector", collector.clone()).unwrap();

    registry.broadcast(&TelemetryEvent::call("op", 0.5, None));
    registry.broadcast(&TelemetryEvent::call("op", 1.5, Some("bad".to_string())));
    registry.broadcast(&TelemetryEvent::error("op", "Bad", "bad"));

    let summary = collector.get("op").unwrap();
    assert_eq!(summary.count, 2);
    assert_eq!(summary.error_count, 1);
    assert!((summary.avg_time - 1.0).abs() < 1e-9);
    assert!((summary.min_time - 0.5).abs() < 1e-9);
    assert!((summary.max_time - 1.5).abs() < 1e-9);

    collector.reset();
    assert!(collector.summary().is_empty());
}

#[tokio::test]
async fn test_queued_dispatcher_delivers_and_drains_on_cancel() {
    let registry = Arc::new(PluginRegistry::new());
    let collector = Arc::new(CallCollector::new());
    registry.register_shared("collector", collector.clone()).unwrap();

    let token = CancellationToken::new();
    let (notifier, handle) = spawn_dispatcher(registry.clone(), 64, token.clone());

    for _ in 0..10 {
        notifier.notify(call_event("queued", true));
    }
    token.cancel();
    handle.await.unwrap();

    assert_eq!(collector.get("queued").unwrap().count, 10);

    // After shutdown events are dropped, not delivered and not panicking.
    notifier.notify(call_event("queued", true));
    assert_eq!(collector.get("queued").unwrap().count, 10);
}
