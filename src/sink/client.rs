use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::SinkError;

pub const RETRYABLE_STATUS: [u16; 4] = [500, 502, 503, 504];

/// Exponential backoff: `base * 2^retry`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Every delay a fully failing delivery would wait through.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_retries).map(|retry| self.delay_for(retry)).collect()
    }

    pub fn is_retryable_status(status: u16) -> bool {
        RETRYABLE_STATUS.contains(&status)
    }
}

#[derive(Debug, Clone)]
pub struct SinkClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub retry: RetryPolicy,
    pub attempt_timeout: Duration,
}

impl SinkClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(10),
        }
    }

    /// `MONITOR_URL` is required, `API_KEY` optional.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("MONITOR_URL").ok().filter(|u| !u.is_empty())?;
        let mut config = Self::new(base_url);
        config.api_key = std::env::var("API_KEY").ok().filter(|k| !k.is_empty());
        Some(config)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }
}

/// Result of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub status: u16,
    pub attempts: u32,
    pub delays: Vec<Duration>,
}

/// POSTs JSON payloads to a remote monitoring endpoint.
#[derive(Clone)]
pub struct ExternalSinkClient {
    client: Client,
    config: Arc<SinkClientConfig>,
}

impl ExternalSinkClient {
    pub fn new(config: SinkClientConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(config.attempt_timeout)
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &SinkClientConfig {
        &self.config
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn with_credential(&self, payload: Value) -> Value {
        let mut body = match payload {
            Value::Object(map) => Value::Object(map),
            other => json!({ "payload": other }),
        };
        if let (Some(key), Value::Object(map)) = (&self.config.api_key, &mut body) {
            map.insert("api_key".to_string(), Value::String(key.clone()));
        }
        body
    }

    /// Delivers `payload` to `base_url + path`.
    ///
    /// Retries 500/502/503/504, attempt timeouts and connection failures with
    /// exponential backoff. Other statuses and transport errors end the
    /// delivery at once. Every outcome is logged.
    pub async fn send(&self, path: &str, payload: Value) -> Result<Delivery, SinkError> {
        let url = self.url_for(path);
        let body = self.with_credential(payload);
        let policy = &self.config.retry;
        let mut delays = Vec::new();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let request = self.client.post(&url).json(&body).send();

            let failure = match tokio::time::timeout(self.config.attempt_timeout, request).await {
                Ok(Ok(response)) => {
                    let status = response.status().as_u16();
                    if response.status().is_success() {
                        info!(url = %url, status, attempt, "Telemetry delivered");
                        return Ok(Delivery { status, attempts: attempt, delays });
                    }
                    if !RetryPolicy::is_retryable_status(status) {
                        error!(url = %url, status, attempt, "Telemetry rejected by endpoint");
                        return Err(SinkError::Status(status));
                    }
                    SinkError::Status(status)
                }
                Ok(Err(e)) if e.is_timeout() => SinkError::Timeout(self.config.attempt_timeout),
                Ok(Err(e)) if e.is_connect() => SinkError::Transport(e.to_string()),
                Ok(Err(e)) => {
                    error!(url = %url, attempt, "Telemetry delivery failed: {}", e);
                    return Err(SinkError::Transport(e.to_string()));
                }
                Err(_) => SinkError::Timeout(self.config.attempt_timeout),
            };

            if attempt > policy.max_retries {
                error!(url = %url, attempts = attempt, "Telemetry delivery gave up: {}", failure);
                return Err(SinkError::RetriesExhausted {
                    attempts: attempt,
                    last: failure.to_string(),
                });
            }

            let delay = policy.delay_for(attempt - 1);
            warn!(url = %url, attempt, ?delay, "Retrying telemetry delivery: {}", failure);
            delays.push(delay);
            tokio::time::sleep(delay).await;
        }
    }
}
