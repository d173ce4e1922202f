// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{record, start_sink, test_config, wait_for_event};
use log_sink::{
    errors::{classify, ApiErrorCategory},
    record::PayloadBuilder,
    ErrorKind, HttpTransport, LogLevel, LogRecord, SinkConfig, SinkError, SinkEvent, Transport,
    TransportError,
};
use mockito::{Matcher, Server};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn config_for(server: &Server) -> SinkConfig {
    SinkConfig {
        endpoint: format!("{}/log", server.url()),
        request_timeout: Duration::from_secs(5),
        ..test_config()
    }
}

fn payload(message: &str) -> log_sink::Payload {
    PayloadBuilder::new("test-api-key".to_string(), "unit-host".to_string())
        .build(&LogRecord::new(LogLevel::Info, message))
        .expect("failed to build payload")
}

#[tokio::test]
async fn test_http_transport_posts_json() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/log")
        .match_header("Content-Type", "application/json")
        .match_header("X-Source", "integration")
        .match_body(Matcher::PartialJsonString(
            r#"{"api_key":"test-api-key","hostname":"unit-host","message":"hello"}"#.to_string(),
        ))
        .with_status(202)
        .create_async()
        .await;

    let mut extra_headers = HashMap::new();
    extra_headers.insert("X-Source".to_string(), "integration".to_string());
    let config = SinkConfig {
        extra_headers,
        ..config_for(&server)
    };
    let transport = HttpTransport::new(&config).expect("failed to create transport");

    let result = transport.send(&payload("hello")).await;

    assert!(result.is_ok(), "unexpected {result:?}");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_http_transport_reports_status() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/log")
        .with_status(429)
        .with_header("Retry-After", "30")
        .with_body(r#"{"message":"slow down"}"#)
        .create_async()
        .await;

    let transport = HttpTransport::new(&config_for(&server)).expect("failed to create transport");
    let error = transport
        .send(&payload("too fast"))
        .await
        .expect_err("429 must fail");

    match &error {
        TransportError::Status {
            status, headers, ..
        } => {
            assert_eq!(*status, 429);
            assert_eq!(headers.get("retry-after").map(String::as_str), Some("30"));
        }
        other => panic!("unexpected error {other:?}"),
    }

    match classify(error) {
        SinkError::Api(api) => {
            assert_eq!(api.category, ApiErrorCategory::RateLimit);
            assert_eq!(api.to_string(), "429 slow down");
        }
        other => panic!("unexpected classification {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_http_transport_connection_refused() {
    // Reserve a port, then free it so nothing is listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let config = SinkConfig {
        endpoint: format!("http://{addr}/log"),
        ..test_config()
    };
    let transport = HttpTransport::new(&config).expect("failed to create transport");
    let error = transport
        .send(&payload("nobody home"))
        .await
        .expect_err("no server");

    assert!(matches!(error, TransportError::Network(_)));
    assert_eq!(classify(error).kind(), ErrorKind::ConnectionError);
}

#[tokio::test]
async fn test_sink_recovers_after_server_error() {
    let mut server = Server::new_async().await;
    let failing = server
        .mock("POST", "/log")
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(1)
        .create_async()
        .await;
    let succeeding = server
        .mock("POST", "/log")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let config = SinkConfig {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(200),
        ..config_for(&server)
    };
    let transport = Arc::new(HttpTransport::new(&config).expect("failed to create transport"));
    let (handle, mut events) = start_sink(config, transport);

    handle.submit(record("retry me"));
    let seen = wait_for_event(&mut events, |e| *e == SinkEvent::Drained).await;

    let error = seen
        .iter()
        .find_map(|e| match e {
            SinkEvent::Error(error) => Some(error.clone()),
            _ => None,
        })
        .expect("an error event");
    assert_eq!(error.kind(), ErrorKind::GenericDeliveryError);
    assert_eq!(error.to_string(), "500 Internal Server Error");

    failing.assert_async().await;
    succeeding.assert_async().await;
    handle.close().await;
}
