pub mod dispatcher;
pub mod registry;
pub mod sinks;

pub use dispatcher::{spawn_dispatcher, Notifier, DEFAULT_QUEUE_CAPACITY};
pub use registry::{BroadcastReport, DispatchOutcome, PluginRegistry, SinkHandler, SinkRegistration, SinkState};
pub use sinks::{CallCollector, LogSink};
