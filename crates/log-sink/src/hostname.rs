// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hostname detection for the shipping identity.

use std::env;
use tracing::warn;

/// Resolves the host identifier stamped on every payload.
///
/// Tries, in order: `LOG_SINK_HOSTNAME`, `HOSTNAME`, the system hostname,
/// and finally `"unknown"`.
#[must_use]
pub fn get_hostname() -> String {
    for var in ["LOG_SINK_HOSTNAME", "HOSTNAME"] {
        if let Ok(hostname) = env::var(var) {
            if !hostname.is_empty() {
                return hostname;
            }
        }
    }

    match nix::unistd::gethostname() {
        Ok(hostname) => {
            if let Some(hostname) = hostname.to_str() {
                if !hostname.is_empty() {
                    return hostname.to_string();
                }
            }
        }
        Err(e) => {
            warn!("Failed to get system hostname: {}", e);
        }
    }

    warn!("Could not determine hostname, using 'unknown'");
    "unknown".to_string()
}
