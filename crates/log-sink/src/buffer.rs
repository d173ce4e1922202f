// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Byte-bounded holding area for payloads awaiting redelivery.
//!
//! Admission is checked before insertion: a payload is kept only when
//! `size + payload.len() < max_bytes`. Anything else is dropped without an
//! error, which keeps the sender available at the cost of completeness.
//!
//! A single payload at or above `max_bytes` can never be admitted, even into
//! an empty buffer. Such drops are logged at `warn` so they are at least
//! visible to operators.

use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::record::Payload;

#[derive(Debug)]
pub struct Buffer {
    entries: VecDeque<Payload>,
    size: usize,
    max_bytes: usize,
}

impl Buffer {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Buffer {
            entries: VecDeque::new(),
            size: 0,
            max_bytes,
        }
    }

    /// Admits `payload` if it fits in the remaining budget.
    ///
    /// Returns whether the payload was kept.
    pub fn add(&mut self, payload: Payload) -> bool {
        let len = payload.len();
        if len >= self.max_bytes {
            warn!(
                "LOGS | Dropping payload of {} bytes: larger than the {} byte buffer",
                len, self.max_bytes
            );
            return false;
        }
        if self.size.saturating_add(len) >= self.max_bytes {
            debug!(
                "LOGS | Buffer full ({}/{} bytes), dropping payload of {} bytes",
                self.size, self.max_bytes, len
            );
            return false;
        }
        self.size += len;
        self.entries.push_back(payload);
        true
    }

    /// Takes every buffered payload in admission order and leaves the buffer empty.
    pub fn flush(&mut self) -> Vec<Payload> {
        self.size = 0;
        self.entries.drain(..).collect()
    }

    /// Bytes currently held.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of payloads currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
