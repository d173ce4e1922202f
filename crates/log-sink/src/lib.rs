// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Log Sink
//!
//! Resilient delivery of log records to a remote collector.
//!
//! Records submitted through a [`orchestrator::SinkHandle`] are sent right away
//! when the sink is healthy. When delivery fails the payload is kept in a
//! byte-bounded in-memory [`buffer::Buffer`] and a reconnect is armed on the
//! [`backoff::BackoffScheduler`]; the next flush re-sends everything buffered.
//!
//! ```text
//!   submit ──> SinkService ──> Transport::send ──ok──> reset backoff
//!                  │                  │
//!                  │               failure
//!                  v                  v
//!               Buffer <──────── schedule_reconnect(flush)
//! ```
//!
//! Lifecycle is surfaced on a broadcast channel of [`events::SinkEvent`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod backoff;
pub mod buffer;
pub mod config;
pub mod constants;
pub mod errors;
pub mod events;
pub mod hostname;
pub mod logger;
pub mod orchestrator;
pub mod record;
pub mod transport;

pub use config::SinkConfig;
pub use errors::{ErrorKind, SinkError, TransportError};
pub use events::SinkEvent;
pub use orchestrator::{SinkHandle, SinkService};
pub use record::{LogLevel, LogRecord, Payload};
pub use transport::{HttpTransport, Transport};
