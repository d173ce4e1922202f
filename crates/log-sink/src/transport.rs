// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of a single payload to the collector.
//!
//! [`Transport`] is the seam the sink depends on. It makes one attempt per
//! call and never retries on its own; retry policy belongs to the sink.
//!
//! [`HttpTransport`] POSTs the payload as JSON with a per-request timeout and
//! an optional HTTPS proxy.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::SinkConfig;
use crate::errors::{SinkError, TransportError};
use crate::record::Payload;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Makes one delivery attempt for `payload`.
    async fn send(&self, payload: &Payload) -> Result<(), TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let client = build_client(config.request_timeout, config.https_proxy.as_deref())?;
        let headers = build_headers(&config.extra_headers)?;
        Ok(HttpTransport {
            client,
            endpoint: config.endpoint.clone(),
            headers,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &Payload) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .body(payload.as_str().to_owned())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(e.to_string())
                } else {
                    TransportError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            debug!("LOGS | Delivered {} bytes ({})", payload.len(), status);
            return Ok(());
        }

        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect::<HashMap<_, _>>();
        // Don't fail the classification because the body could not be read
        let body = resp.text().await.unwrap_or_default();

        Err(TransportError::Status {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

fn build_client(
    timeout: Duration,
    https_proxy: Option<&str>,
) -> Result<reqwest::Client, SinkError> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(15))
        .tcp_keepalive(Duration::from_secs(10));

    if let Some(proxy) = https_proxy {
        let proxy = reqwest::Proxy::https(proxy)
            .map_err(|e| SinkError::InvalidConfig(format!("invalid https proxy: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| SinkError::InvalidConfig(format!("failed to build HTTP client: {e}")))
}

fn build_headers(extra_headers: &HashMap<String, String>) -> Result<HeaderMap, SinkError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in extra_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SinkError::InvalidConfig(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SinkError::InvalidConfig(format!("invalid value for header {name}: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_headers_adds_content_type() {
        let mut extra = HashMap::new();
        extra.insert("X-Source".to_string(), "unit".to_string());
        let headers = build_headers(&extra).expect("failed to build headers");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers["x-source"], "unit");
    }

    #[test]
    fn test_build_headers_rejects_bad_name() {
        let mut extra = HashMap::new();
        extra.insert("bad header".to_string(), "v".to_string());
        assert!(matches!(
            build_headers(&extra),
            Err(SinkError::InvalidConfig(_))
        ));
    }
}
