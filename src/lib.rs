pub mod compose;
pub mod config;
pub mod error;
pub mod instrumentation;
pub mod plugin;
pub mod sink;
pub mod telemetry;

// Re-export the pieces most callers need
pub use compose::{Composer, Layer, Operation};
pub use config::{InstrumentationConfig, LiveSwitches};
pub use instrumentation::{Instrumentation, ResetScope};
pub use plugin::{PluginRegistry, SinkHandler};
