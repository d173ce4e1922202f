// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Default construction parameters for the sink.

use std::time::Duration;

/// Collector endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "https://cloudsanialapi.com/log";

/// Byte budget of the retry buffer (1 MiB).
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 1024 * 1024;

/// Scheduled reconnects before the sink stops sending live.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 25;

/// Reconnects fired at one delay before that delay doubles.
pub const DEFAULT_DECAY_THRESHOLD: u32 = 5;

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Per-request timeout applied by the HTTP transport.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the notification channel. Slow subscribers lag, they never block delivery.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
