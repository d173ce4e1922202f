// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::backoff::BackoffConfig;
use crate::constants;
use crate::errors::SinkError;

/// Construction parameters for a sink.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// API key stamped on every payload. Required.
    pub api_key: String,
    /// Host identifier; detected from the environment when unset
    pub hostname: Option<String>,
    /// Collector URL payloads are POSTed to
    pub endpoint: String,
    /// Byte budget of the retry buffer
    pub max_buffer_bytes: usize,
    pub max_attempts: u32,
    pub decay_threshold: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Per-request timeout of the HTTP transport
    pub request_timeout: Duration,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Headers sent with every request besides `Content-Type`
    pub extra_headers: HashMap<String, String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            hostname: None,
            endpoint: constants::DEFAULT_ENDPOINT.to_string(),
            max_buffer_bytes: constants::DEFAULT_MAX_BUFFER_BYTES,
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            decay_threshold: constants::DEFAULT_DECAY_THRESHOLD,
            initial_delay: constants::DEFAULT_INITIAL_DELAY,
            max_delay: constants::DEFAULT_MAX_DELAY,
            request_timeout: constants::DEFAULT_REQUEST_TIMEOUT,
            https_proxy: None,
            extra_headers: HashMap::new(),
        }
    }
}

impl SinkConfig {
    /// Creates a configuration with defaults for everything but the API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, SinkError> {
        let defaults = Self::default();

        let api_key = env::var("LOG_SINK_API_KEY").unwrap_or_default();
        let hostname = env::var("LOG_SINK_HOSTNAME")
            .ok()
            .filter(|h| !h.trim().is_empty());
        let endpoint = env::var("LOG_SINK_ENDPOINT").unwrap_or(defaults.endpoint);
        let max_buffer_bytes =
            parse_env("LOG_SINK_MAX_BUFFER_BYTES").unwrap_or(defaults.max_buffer_bytes);
        let max_attempts = parse_env("LOG_SINK_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts);
        let decay_threshold =
            parse_env("LOG_SINK_DECAY_THRESHOLD").unwrap_or(defaults.decay_threshold);
        let initial_delay = parse_env("LOG_SINK_INITIAL_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_delay);
        let max_delay = parse_env("LOG_SINK_MAX_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_delay);
        let request_timeout = parse_env("LOG_SINK_REQUEST_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout);
        let https_proxy = env::var("LOG_SINK_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();

        let config = Self {
            api_key,
            hostname,
            endpoint,
            max_buffer_bytes,
            max_attempts,
            decay_threshold,
            initial_delay,
            max_delay,
            request_timeout,
            https_proxy,
            extra_headers: HashMap::new(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.api_key.trim().is_empty() {
            return Err(SinkError::MissingParameter("api_key"));
        }

        if reqwest::Url::parse(&self.endpoint).is_err() {
            return Err(SinkError::InvalidConfig(format!(
                "endpoint '{}' is not a valid URL",
                self.endpoint
            )));
        }

        if self.max_buffer_bytes == 0 {
            return Err(SinkError::InvalidConfig(
                "max buffer bytes must be greater than 0".to_string(),
            ));
        }

        if self.max_attempts == 0 || self.decay_threshold == 0 {
            return Err(SinkError::InvalidConfig(
                "max attempts and decay threshold must be greater than 0".to_string(),
            ));
        }

        if self.initial_delay.is_zero() || self.max_delay < self.initial_delay {
            return Err(SinkError::InvalidConfig(format!(
                "delays must satisfy 0 < initial ({:?}) <= max ({:?})",
                self.initial_delay, self.max_delay
            )));
        }

        Ok(())
    }

    #[must_use]
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            max_attempts: self.max_attempts,
            decay_threshold: self.decay_threshold,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
        }
    }
}

fn parse_env<T: FromStr>(var: &str) -> Option<T> {
    let raw = env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {var}: '{raw}' is not a valid value");
            None
        }
    }
}
