// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle notifications published by the sink.
//!
//! Events go out on a `tokio::sync::broadcast` channel. Subscribing is
//! cloning a receiver, unsubscribing is dropping it. Publishing never waits
//! for subscribers and succeeds whether or not anybody listens; a subscriber
//! that falls more than [`crate::constants::EVENT_CHANNEL_CAPACITY`] events
//! behind observes `RecvError::Lagged`.

use tokio::sync::broadcast;
use tracing::trace;

use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::errors::SinkError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// A record was handed to the delivery pipeline.
    Accepted,
    /// A delivery failure, already classified. See [`SinkError::kind`].
    Error(SinkError),
    /// The retry budget is spent and live sending has been disabled.
    Exhausted { attempts: u32 },
    /// A flush cycle redelivered every buffered payload.
    Drained,
    /// Shutdown completed.
    Closed,
}

impl SinkEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SinkEvent::Accepted => "accepted",
            SinkEvent::Error(_) => "error",
            SinkEvent::Exhausted { .. } => "exhausted",
            SinkEvent::Drained => "drained",
            SinkEvent::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<SinkEvent>,
}

impl EventPublisher {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventPublisher { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SinkEvent) {
        let name = event.name();
        // Err only means there are no subscribers right now
        if self.tx.send(event).is_err() {
            trace!("LOGS | No subscribers for {} event", name);
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let publisher = EventPublisher::new();
        assert_eq!(publisher.subscriber_count(), 0);
        publisher.publish(SinkEvent::Accepted);
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let publisher = EventPublisher::new();
        let mut rx = publisher.subscribe();

        publisher.publish(SinkEvent::Accepted);
        publisher.publish(SinkEvent::Error(SinkError::ResendFailed { failed: 2 }));
        publisher.publish(SinkEvent::Drained);

        assert_eq!(rx.recv().await.expect("recv"), SinkEvent::Accepted);
        assert_eq!(rx.recv().await.expect("recv").name(), "error");
        assert_eq!(rx.recv().await.expect("recv"), SinkEvent::Drained);
    }

    #[test]
    fn test_unsubscribe_by_drop() {
        let publisher = EventPublisher::new();
        let rx = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 1);
        drop(rx);
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
