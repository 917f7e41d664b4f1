use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::compose::Layer;
use crate::error::ConfigError;

const LOG_LEVELS: [&str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];

/// Feature switches and reporting knobs consumed at composition time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    pub enable_monitoring: bool,
    pub enable_logging: bool,
    pub enable_performance: bool,
    pub enable_error_handling: bool,
    pub log_level: String,
    /// Seconds between periodic performance reports.
    pub performance_logging_interval: u64,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            enable_monitoring: true,
            enable_logging: true,
            enable_performance: true,
            enable_error_handling: true,
            log_level: "INFO".to_string(),
            performance_logging_interval: 60,
        }
    }
}

impl InstrumentationConfig {
    /// Everything off. Useful as a starting point for builders.
    pub fn disabled() -> Self {
        Self {
            enable_monitoring: false,
            enable_logging: false,
            enable_performance: false,
            enable_error_handling: false,
            ..Self::default()
        }
    }

    /// Parses a (possibly partial) JSON document over the defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        normalize_level(&config.log_level)?;
        Ok(config)
    }

    /// Updates a single key, validating the JSON type against the default.
    pub fn update(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        let invalid = |expected| ConfigError::InvalidType { key: key.to_string(), expected };
        match key {
            "enable_monitoring" => self.enable_monitoring = value.as_bool().ok_or_else(|| invalid("bool"))?,
            "enable_logging" => self.enable_logging = value.as_bool().ok_or_else(|| invalid("bool"))?,
            "enable_performance" => self.enable_performance = value.as_bool().ok_or_else(|| invalid("bool"))?,
            "enable_error_handling" => {
                self.enable_error_handling = value.as_bool().ok_or_else(|| invalid("bool"))?
            }
            "log_level" => {
                let level = value.as_str().ok_or_else(|| invalid("string"))?;
                self.log_level = normalize_level(level)?;
            }
            "performance_logging_interval" => {
                self.performance_logging_interval = value.as_u64().ok_or_else(|| invalid("unsigned integer"))?
            }
            other => {
                warn!(key = other, "Attempted to update unknown configuration key");
                return Err(ConfigError::UnknownKey(other.to_string()));
            }
        }
        info!(key, "Configuration updated");
        Ok(())
    }

    pub fn reporting_interval(&self) -> Duration {
        Duration::from_secs(self.performance_logging_interval.max(1))
    }

    /// Enabled layers, outermost first.
    pub fn layers(&self) -> Vec<Layer> {
        Layer::ORDER
            .into_iter()
            .filter(|layer| match layer {
                Layer::Monitor => self.enable_monitoring,
                Layer::ErrorCapture => self.enable_error_handling,
                Layer::Logging => self.enable_logging,
                Layer::Performance => self.enable_performance,
            })
            .collect()
    }

    /// Default directive for `tracing-subscriber`; `RUST_LOG` takes precedence.
    pub fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        let level = normalize_level(&self.log_level)?.to_lowercase();
        Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
    }
}

fn normalize_level(level: &str) -> Result<String, ConfigError> {
    let upper = level.trim().to_uppercase();
    let upper = if upper == "WARNING" { "WARN".to_string() } else { upper };
    if LOG_LEVELS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(ConfigError::InvalidLogLevel(level.to_string()))
    }
}

/// Switches read fresh on every invocation of a dynamic composition.
#[derive(Debug)]
pub struct LiveSwitches {
    monitoring: AtomicBool,
    logging: AtomicBool,
    performance: AtomicBool,
    error_handling: AtomicBool,
}

impl LiveSwitches {
    pub fn from_config(config: &InstrumentationConfig) -> Self {
        Self {
            monitoring: AtomicBool::new(config.enable_monitoring),
            logging: AtomicBool::new(config.enable_logging),
            performance: AtomicBool::new(config.enable_performance),
            error_handling: AtomicBool::new(config.enable_error_handling),
        }
    }

    fn flag(&self, layer: Layer) -> &AtomicBool {
        match layer {
            Layer::Monitor => &self.monitoring,
            Layer::ErrorCapture => &self.error_handling,
            Layer::Logging => &self.logging,
            Layer::Performance => &self.performance,
        }
    }

    pub fn is_enabled(&self, layer: Layer) -> bool {
        self.flag(layer).load(Ordering::Acquire)
    }

    pub fn set(&self, layer: Layer, enabled: bool) {
        self.flag(layer).store(enabled, Ordering::Release);
        info!(?layer, enabled, "Layer toggled");
    }
}

impl Default for LiveSwitches {
    fn default() -> Self {
        Self::from_config(&InstrumentationConfig::default())
    }
}
