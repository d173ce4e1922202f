// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared helpers for sink integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use log_sink::{
    orchestrator::{SinkHandle, SinkService, SinkSnapshot},
    LogLevel, LogRecord, Payload, SinkConfig, SinkEvent, Transport, TransportError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Transport that replays scripted outcomes, then falls back to a default.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    fallback: Result<(), TransportError>,
    calls: AtomicUsize,
    delivered: Mutex<Vec<Payload>>,
}

impl ScriptedTransport {
    pub fn succeeding() -> Arc<Self> {
        Self::with_script(Vec::new(), Ok(()))
    }

    pub fn failing() -> Arc<Self> {
        Self::with_script(Vec::new(), Err(network_down()))
    }

    pub fn with_script(
        script: Vec<Result<(), TransportError>>,
        fallback: Result<(), TransportError>,
    ) -> Arc<Self> {
        Arc::new(ScriptedTransport {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<Payload> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, payload: &Payload) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        if outcome.is_ok() {
            self.delivered.lock().unwrap().push(payload.clone());
        }
        outcome
    }
}

pub fn network_down() -> TransportError {
    TransportError::Network("connection refused".to_string())
}

pub fn test_config() -> SinkConfig {
    SinkConfig {
        hostname: Some("unit-host".to_string()),
        ..SinkConfig::new("test-api-key")
    }
}

/// Builds the service, spawns it and returns the handle with a subscription
/// taken before any record is submitted.
pub fn start_sink(
    config: SinkConfig,
    transport: Arc<dyn Transport>,
) -> (SinkHandle, broadcast::Receiver<SinkEvent>) {
    let (service, handle) =
        SinkService::new(&config, transport).expect("failed to create sink service");
    let events = handle.subscribe();
    tokio::spawn(service.run());
    (handle, events)
}

pub fn record(message: &str) -> LogRecord {
    LogRecord::new(LogLevel::Info, message)
}

/// Receives events until one matches `pred`, returning everything seen.
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<SinkEvent>,
    pred: impl Fn(&SinkEvent) -> bool,
) -> Vec<SinkEvent> {
    let mut seen = Vec::new();
    let result = tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            let done = pred(&event);
            seen.push(event);
            if done {
                break;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for event, saw {seen:?}");
    seen
}

/// Events already published and not yet received.
pub fn drain_events(events: &mut broadcast::Receiver<SinkEvent>) -> Vec<SinkEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

/// Lets spawned deliveries settle, then takes a snapshot.
///
/// With a paused clock the sleep only completes once every other task is idle.
pub async fn settled_snapshot(handle: &SinkHandle) -> SinkSnapshot {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
    handle.snapshot().await.expect("sink stopped")
}
