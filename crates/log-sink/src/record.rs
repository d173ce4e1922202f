// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log records as handed over by the host logger, and their wire payloads.
//!
//! A payload is one JSON object:
//!
//! ```json
//! {
//!   "api_key": "...",
//!   "hostname": "web-1",
//!   "log_level": "info",
//!   "message": "user signed in",
//!   "metadata": {"user_id": 42},
//!   "timestamp": 1718000000000
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Silly,
    Debug,
    Verbose,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Silly => "silly",
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "verbose",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name case-insensitively. `warning` is accepted as `warn`.
    #[must_use]
    pub fn parse(level: &str) -> Option<Self> {
        match level.trim().to_lowercase().as_str() {
            "silly" => Some(LogLevel::Silly),
            "debug" => Some(LogLevel::Debug),
            "verbose" => Some(LogLevel::Verbose),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log event produced by the host logging framework.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: Value,
    pub metadata: Map<String, Value>,
    /// Milliseconds since the Unix epoch, assigned by the producer.
    pub timestamp_ms: u64,
}

impl LogRecord {
    /// Creates a record stamped with the current wall-clock time.
    pub fn new(level: LogLevel, message: impl Into<Value>) -> Self {
        LogRecord {
            level,
            message: message.into(),
            metadata: Map::new(),
            timestamp_ms: now_ms(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Message text as shipped: strings verbatim, any other value as compact JSON.
    #[must_use]
    pub fn formatted_message(&self) -> String {
        match &self.message {
            Value::String(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Serialized wire form of a single record. Cloning shares the underlying bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Payload(Arc<str>);

impl Payload {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Payload {
    fn from(body: String) -> Self {
        Payload(Arc::from(body))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The body carries the API key
        write!(f, "Payload({} bytes)", self.len())
    }
}

#[derive(Serialize)]
struct WirePayload<'a> {
    api_key: &'a str,
    hostname: &'a str,
    log_level: LogLevel,
    message: String,
    metadata: &'a Map<String, Value>,
    timestamp: u64,
}

/// Stamps records with the shipping identity and serializes them.
#[derive(Clone)]
pub struct PayloadBuilder {
    api_key: String,
    hostname: String,
}

impl PayloadBuilder {
    #[must_use]
    pub fn new(api_key: String, hostname: String) -> Self {
        PayloadBuilder { api_key, hostname }
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn build(&self, record: &LogRecord) -> Result<Payload, serde_json::Error> {
        let wire = WirePayload {
            api_key: &self.api_key,
            hostname: &self.hostname,
            log_level: record.level,
            message: record.formatted_message(),
            metadata: &record.metadata,
            timestamp: record.timestamp_ms,
        };
        serde_json::to_string(&wire).map(Payload::from)
    }
}

impl fmt::Debug for PayloadBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadBuilder")
            .field("hostname", &self.hostname)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder() -> PayloadBuilder {
        PayloadBuilder::new("test-api-key".to_string(), "unit-host".to_string())
    }

    #[test]
    fn test_payload_shape() {
        let record = LogRecord {
            level: LogLevel::Warn,
            message: json!("disk almost full"),
            metadata: Map::new(),
            timestamp_ms: 1_700_000_000_000,
        }
        .with_field("mount", "/var");

        let payload = builder().build(&record).expect("failed to build payload");
        let parsed: Value = serde_json::from_str(payload.as_str()).expect("invalid json");
        assert_eq!(
            parsed,
            json!({
                "api_key": "test-api-key",
                "hostname": "unit-host",
                "log_level": "warn",
                "message": "disk almost full",
                "metadata": {"mount": "/var"},
                "timestamp": 1_700_000_000_000u64,
            })
        );
    }

    #[test]
    fn test_non_string_message_is_serialized() {
        let record = LogRecord::new(LogLevel::Info, json!({"event": "login", "ok": true}));
        let payload = builder().build(&record).expect("failed to build payload");
        let parsed: Value = serde_json::from_str(payload.as_str()).expect("invalid json");
        assert_eq!(parsed["message"], json!(r#"{"event":"login","ok":true}"#));
    }

    #[test]
    fn test_payload_len_counts_bytes() {
        let payload = Payload::from("héllo".to_string());
        assert_eq!(payload.len(), 6);
        assert!(!payload.is_empty());
    }

    #[test]
    fn test_payload_debug_hides_body() {
        let payload = builder()
            .build(&LogRecord::new(LogLevel::Info, "hello"))
            .expect("failed to build payload");
        assert!(!format!("{payload:?}").contains("test-api-key"));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("INFO"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse(" silly "), Some(LogLevel::Silly));
        assert_eq!(LogLevel::parse("fatal"), None);
        assert_eq!(LogLevel::Verbose.to_string(), "verbose");
    }
}
