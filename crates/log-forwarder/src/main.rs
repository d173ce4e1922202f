// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process::ExitCode, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use log_sink::{
    logger::Formatter, HttpTransport, LogLevel, LogRecord, SinkConfig, SinkEvent, SinkService,
};
use serde_json::Value;

const DEFAULT_LOG_LEVEL: &str = "info";
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = parse_log_level(env::var("LOG_SINK_LOG_LEVEL").ok());

    let env_filter = format!(
        "h2=off,hyper=off,rustls=off,{}",
        log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    );
    let filter =
        EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_ansi(false)
        .event_format(Formatter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }

    if let Err(raw) = &log_level {
        warn!("Ignoring LOG_SINK_LOG_LEVEL '{raw}', using {DEFAULT_LOG_LEVEL}");
    }

    let config = match SinkConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading sink configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let transport = match HttpTransport::new(&config) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!("Error creating HTTP transport: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (service, handle) = match SinkService::new(&config, transport) {
        Ok(pair) => pair,
        Err(e) => {
            error!("Error creating log sink: {e}");
            return ExitCode::FAILURE;
        }
    };

    let events = handle.subscribe();
    let service_task = tokio::spawn(service.run());
    let events_task = tokio::spawn(log_events(events));

    info!("Forwarding stdin to {}", config.endpoint);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(record) = parse_line(&line) {
                        handle.submit(record);
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    error!("Error reading stdin: {e}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    handle.close().await;
    if let Err(e) = service_task.await {
        error!("Sink service task failed: {e}");
    }
    events_task.abort();

    ExitCode::SUCCESS
}

async fn log_events(mut events: Receiver<SinkEvent>) {
    loop {
        match events.recv().await {
            Ok(SinkEvent::Error(e)) => warn!("sink error ({}): {e}", e.kind()),
            Ok(SinkEvent::Exhausted { attempts }) => {
                warn!("sink gave up on live sends after {attempts} attempts");
            }
            Ok(event) => debug!("sink event: {}", event.name()),
            Err(RecvError::Lagged(skipped)) => debug!("missed {skipped} sink events"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Normalizes the forwarder's own log level. Hands back the raw value when
/// it is not a known level.
fn parse_log_level(raw: Option<String>) -> Result<String, String> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_LOG_LEVEL.to_string());
    };
    let level = raw.trim().to_lowercase();
    if VALID_LOG_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(raw)
    }
}

/// Turns one input line into a record.
///
/// JSON objects may carry `level` and `message`; every other key becomes
/// metadata. Anything else is shipped verbatim at `info`.
fn parse_line(line: &str) -> Option<LogRecord> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Ok(Value::Object(mut fields)) = serde_json::from_str::<Value>(trimmed) else {
        return Some(LogRecord::new(LogLevel::Info, trimmed));
    };

    let level = fields
        .remove("level")
        .and_then(|level| level.as_str().and_then(LogLevel::parse))
        .unwrap_or(LogLevel::Info);
    let message = fields.remove("message").unwrap_or(Value::String(String::new()));

    Some(LogRecord::new(level, message).with_metadata(fields))
}
