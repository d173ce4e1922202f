// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Failure taxonomy for log delivery.
//!
//! Transports report a [`TransportError`]; the sink classifies it into a
//! [`SinkError`] whose [`ErrorKind`] is what subscribers match on.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Raw failure reported by a [`crate::transport::Transport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("{0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status}: {body}")]
    Status {
        status: u16,
        headers: HashMap<String, String>,
        body: String,
    },
}

/// Coarse classification carried on error notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectionError,
    ConnectionTimeoutError,
    GenericDeliveryError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::ConnectionTimeoutError => "connection_timeout_error",
            ErrorKind::GenericDeliveryError => "generic_delivery_error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorCategory {
    BadRequest,
    Authentication,
    PermissionDenied,
    NotFound,
    MethodNotAllowed,
    Conflict,
    Gone,
    UnsupportedMediaType,
    UnprocessableEntity,
    RateLimit,
    InternalServer,
    Other,
}

impl ApiErrorCategory {
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ApiErrorCategory::BadRequest,
            401 => ApiErrorCategory::Authentication,
            403 => ApiErrorCategory::PermissionDenied,
            404 => ApiErrorCategory::NotFound,
            405 => ApiErrorCategory::MethodNotAllowed,
            409 => ApiErrorCategory::Conflict,
            410 => ApiErrorCategory::Gone,
            415 => ApiErrorCategory::UnsupportedMediaType,
            422 => ApiErrorCategory::UnprocessableEntity,
            429 => ApiErrorCategory::RateLimit,
            s if s >= 500 => ApiErrorCategory::InternalServer,
            _ => ApiErrorCategory::Other,
        }
    }
}

/// Structured error response from the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub category: ApiErrorCategory,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status: u16, headers: HashMap<String, String>, body: String) -> Self {
        ApiError {
            status,
            category: ApiErrorCategory::from_status(status),
            headers,
            body,
        }
    }

    /// `message` field of a JSON body, the JSON body itself, or the raw text.
    fn body_message(&self) -> Option<String> {
        if self.body.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(&self.body) {
            Ok(Value::Object(map)) => match map.get("message") {
                Some(Value::String(message)) => Some(message.clone()),
                Some(message) => Some(message.to_string()),
                None => Some(Value::Object(map).to_string()),
            },
            Ok(other) => Some(other.to_string()),
            Err(_) => Some(self.body.clone()),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.body_message() {
            Some(message) => write!(f, "{} {}", self.status, message),
            None => write!(f, "{} status code (no body)", self.status),
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("Connection failure: {message}")]
    Connection { message: String },

    #[error("Logging service timeout: {message}")]
    ConnectionTimeout { message: String },

    #[error("{0}")]
    Api(ApiError),

    #[error("Failed to resend {failed} logs")]
    ResendFailed { failed: usize },

    #[error("Max retry attempts reached after {attempts} reconnects. Logging disabled.")]
    RetriesExhausted { attempts: u32 },

    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SinkError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SinkError::Connection { .. } => ErrorKind::ConnectionError,
            SinkError::ConnectionTimeout { .. } => ErrorKind::ConnectionTimeoutError,
            SinkError::Api(_)
            | SinkError::ResendFailed { .. }
            | SinkError::RetriesExhausted { .. }
            | SinkError::MissingParameter(_)
            | SinkError::InvalidConfig(_) => ErrorKind::GenericDeliveryError,
        }
    }
}

/// Maps a transport failure onto the delivery taxonomy.
#[must_use]
pub fn classify(error: TransportError) -> SinkError {
    match error {
        TransportError::Timeout(message) => SinkError::ConnectionTimeout { message },
        TransportError::Network(message) => {
            if message.to_lowercase().contains("timeout") {
                SinkError::ConnectionTimeout { message }
            } else {
                SinkError::Connection { message }
            }
        }
        TransportError::Status {
            status,
            headers,
            body,
        } => SinkError::Api(ApiError::new(status, headers, body)),
    }
}
