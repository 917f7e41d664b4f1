use anyhow::Context;
use callscope::plugin::{CallCollector, LogSink, DEFAULT_QUEUE_CAPACITY};
use callscope::sink::{ExternalMonitorSink, ExternalSinkClient, SinkClientConfig};
use callscope::{Instrumentation, InstrumentationConfig, ResetScope};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
enum ArithmeticError {
    #[error("division by zero is not allowed")]
    DivisionByZero,
    #[error("negative values are not allowed for x")]
    NegativeInput,
}

fn divide((x, y): (f64, f64)) -> Result<f64, ArithmeticError> {
    if y == 0.0 {
        return Err(ArithmeticError::DivisionByZero);
    }
    if x < 0.0 {
        return Err(ArithmeticError::NegativeInput);
    }
    Ok(x / y)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("CALLSCOPE_CONFIG") {
        Ok(raw) => InstrumentationConfig::from_json(&raw).context("invalid CALLSCOPE_CONFIG")?,
        Err(_) => InstrumentationConfig::default(),
    };

    // Initialize logging/tracing
    tracing_subscriber::fmt()
        .with_env_filter(config.env_filter()?)
        .init();
    tracing::info!(?config, "callscope demo starting");

    let shutdown = CancellationToken::new();
    let (instrumentation, dispatcher) =
        Instrumentation::queued(config, DEFAULT_QUEUE_CAPACITY, shutdown.clone());
    let instrumentation = Arc::new(instrumentation);

    let collector = Arc::new(CallCollector::new());
    let registry = instrumentation.registry();
    registry.register("log", LogSink)?;
    registry.register_shared("collector", collector.clone())?;

    let mut forwarder = None;
    if let Some(sink_config) = SinkClientConfig::from_env() {
        let client = ExternalSinkClient::new(sink_config)?;
        let (sink, handle) = ExternalMonitorSink::spawn(client, DEFAULT_QUEUE_CAPACITY);
        registry.register("external_monitor", sink)?;
        forwarder = Some(handle);
    } else {
        tracing::info!("MONITOR_URL not set; external monitor disabled");
    }

    let reporter = instrumentation.spawn_reporter(shutdown.clone());

    // Each variant gets its own kind in the error summary.
    let divide = instrumentation.wrap_classified(
        "divide",
        Arc::new(|e: &ArithmeticError| match e {
            ArithmeticError::DivisionByZero => "ZeroDivisionError".to_string(),
            ArithmeticError::NegativeInput => "ValueError".to_string(),
        }),
        divide,
    );
    for args in [(10.0, 2.0), (9.0, 3.0), (10.0, 0.0), (-4.0, 2.0)] {
        match divide(args) {
            Ok(value) => println!("divide{:?} = {}", args, value),
            Err(e) => println!("divide{:?} failed: {}", args, e),
        }
    }

    println!("{}", serde_json::to_string_pretty(&instrumentation.performance_summary())?);
    println!("{}", serde_json::to_string_pretty(&instrumentation.error_summary())?);
    instrumentation.publish_summary();

    shutdown.cancel();
    dispatcher.await?;
    reporter.await?;
    println!("collector: {:?}", collector.summary());

    // Dropping the registry's sink handle lets the forwarder drain and exit.
    registry.unregister("external_monitor");
    if let Some(handle) = forwarder {
        handle.await?;
    }

    println!("{}", instrumentation.reset(ResetScope::All));
    Ok(())
}
