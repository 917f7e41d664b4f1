use thiserror::Error;

/// Failure inside the instrumentation machinery itself.
/// Logged and swallowed by the layers, never returned to an instrumented caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("telemetry store lock poisoned: {0}")]
    Poisoned(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("sink '{0}' is already registered")]
    DuplicateSink(String),

    #[error("sink '{0}' is not registered")]
    UnknownSink(String),
}

/// Delivery failure of a sink. Contained inside the core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("attempt timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("endpoint rejected delivery with status {0}")]
    Status(u16),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("sink queue is full")]
    QueueFull,

    #[error("sink queue is closed")]
    Closed,

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("invalid type for '{key}': expected {expected}")]
    InvalidType { key: String, expected: &'static str },

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}
