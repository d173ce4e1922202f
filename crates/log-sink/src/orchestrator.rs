// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery orchestration.
//!
//! [`SinkService`] is the single owner of the retry [`Buffer`], the
//! [`BackoffScheduler`] and the [`SinkState`] flags. It runs as one task and
//! processes [`SinkCommand`]s in order, so none of that state needs a lock.
//! Transport calls run in spawned tasks and report back as commands.
//!
//! ```text
//!   SinkHandle ──Submit──> SinkService ──spawn──> Transport::send
//!                              ^                        │
//!                              └──DeliveryFinished──────┘
//!
//!   BackoffScheduler ──ReconnectFired──> SinkService ──spawn──> JoinSet of sends
//!                                            ^                        │
//!                                            └────FlushFinished───────┘
//! ```
//!
//! A record goes to the buffer instead of the transport while live sends are
//! disabled, while a failure is being handled, or while a flush cycle is
//! pending or running. The flush cycle starts when a reconnect is armed and
//! ends when its redelivery attempts have settled.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::backoff::{BackoffScheduler, BackoffState};
use crate::buffer::Buffer;
use crate::config::SinkConfig;
use crate::errors::{classify, SinkError, TransportError};
use crate::events::{EventPublisher, SinkEvent};
use crate::hostname::get_hostname;
use crate::record::{LogRecord, Payload, PayloadBuilder};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPhase {
    Idle,
    /// A reconnect is armed and will trigger a flush.
    Scheduled,
    /// Buffered payloads are being redelivered.
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkState {
    /// Live sends are permitted.
    pub enabled: bool,
    /// A delivery failure is being handled.
    pub erroring: bool,
    /// Terminal; set once by `close`.
    pub shutting_down: bool,
    pub flush: FlushPhase,
}

impl SinkState {
    fn new() -> Self {
        SinkState {
            enabled: true,
            erroring: false,
            shutting_down: false,
            flush: FlushPhase::Idle,
        }
    }

    /// Whether a new payload must be buffered instead of sent.
    #[must_use]
    pub fn should_buffer(&self) -> bool {
        !self.enabled || self.erroring || self.flush != FlushPhase::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkSnapshot {
    pub state: SinkState,
    pub buffered_bytes: usize,
    pub buffered_payloads: usize,
    pub backoff: BackoffState,
}

#[derive(Debug)]
pub enum SinkCommand {
    Submit(LogRecord),
    DeliveryFinished {
        payload: Payload,
        result: Result<(), TransportError>,
    },
    ReconnectFired,
    Exhausted,
    FlushFinished {
        failed: Vec<Payload>,
        delivered: usize,
    },
    Snapshot(oneshot::Sender<SinkSnapshot>),
    Close(oneshot::Sender<()>),
}

/// Cloneable entry point used by the host logger.
#[derive(Clone)]
pub struct SinkHandle {
    tx: mpsc::UnboundedSender<SinkCommand>,
    events: EventPublisher,
}

impl SinkHandle {
    /// Hands a record to the sink and returns immediately.
    ///
    /// Never blocks on the network and never fails. Records submitted after
    /// `close` are dropped.
    pub fn submit(&self, record: LogRecord) {
        if self.tx.send(SinkCommand::Submit(record)).is_err() {
            debug!("LOGS | Sink stopped, dropping record");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.events.subscribe()
    }

    /// Current state, or `None` once the service has stopped.
    pub async fn snapshot(&self) -> Option<SinkSnapshot> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx.send(SinkCommand::Snapshot(response_tx)).ok()?;
        response_rx.await.ok()
    }

    /// Shuts the sink down after one last flush of buffered payloads.
    ///
    /// Resolves once the `Closed` event has been published. Calling it again
    /// after that resolves immediately.
    pub async fn close(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(SinkCommand::Close(done_tx)).is_err() {
            return;
        }
        // A dropped sender means the service already stopped
        let _ = done_rx.await;
    }
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SinkHandle")
    }
}

pub struct SinkService {
    rx: mpsc::UnboundedReceiver<SinkCommand>,
    tx: mpsc::WeakUnboundedSender<SinkCommand>,
    state: SinkState,
    buffer: Buffer,
    backoff: BackoffScheduler,
    transport: Arc<dyn Transport>,
    payloads: PayloadBuilder,
    events: EventPublisher,
    close_waiters: Vec<oneshot::Sender<()>>,
    final_flush_started: bool,
    closed: bool,
}

impl SinkService {
    pub fn new(
        config: &SinkConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<(Self, SinkHandle), SinkError> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let weak_tx = tx.downgrade();

        let exhausted_tx = weak_tx.clone();
        let backoff = BackoffScheduler::new(config.backoff(), move || {
            if let Some(tx) = exhausted_tx.upgrade() {
                let _ = tx.send(SinkCommand::Exhausted);
            }
        });

        let hostname = config.hostname.clone().unwrap_or_else(get_hostname);
        let events = EventPublisher::new();

        let service = SinkService {
            rx,
            tx: weak_tx,
            state: SinkState::new(),
            buffer: Buffer::new(config.max_buffer_bytes),
            backoff,
            transport,
            payloads: PayloadBuilder::new(config.api_key.clone(), hostname),
            events: events.clone(),
            close_waiters: Vec::new(),
            final_flush_started: false,
            closed: false,
        };

        let handle = SinkHandle { tx, events };

        Ok((service, handle))
    }

    pub async fn run(mut self) {
        debug!(
            "LOGS | Sink service started for host {}",
            self.payloads.hostname()
        );

        while let Some(command) = self.rx.recv().await {
            match command {
                SinkCommand::Submit(record) => self.submit(&record),
                SinkCommand::DeliveryFinished { payload, result } => {
                    self.on_delivery_finished(payload, result);
                }
                SinkCommand::ReconnectFired => self.flush(),
                SinkCommand::Exhausted => self.on_exhausted(),
                SinkCommand::FlushFinished { failed, delivered } => {
                    self.on_flush_finished(failed, delivered);
                }
                SinkCommand::Snapshot(response_tx) => {
                    if response_tx.send(self.snapshot()).is_err() {
                        debug!("LOGS | Snapshot receiver dropped");
                    }
                }
                SinkCommand::Close(done) => self.close(done),
            }

            if self.closed {
                break;
            }
        }

        self.backoff.cancel();
        debug!("LOGS | Sink service stopped");
    }

    fn snapshot(&self) -> SinkSnapshot {
        SinkSnapshot {
            state: self.state,
            buffered_bytes: self.buffer.size(),
            buffered_payloads: self.buffer.len(),
            backoff: self.backoff.state(),
        }
    }

    fn submit(&mut self, record: &LogRecord) {
        if self.state.shutting_down {
            debug!("LOGS | Sink is shutting down, dropping record");
            return;
        }

        self.events.publish(SinkEvent::Accepted);

        match self.payloads.build(record) {
            Ok(payload) => self.attempt_deliver(payload),
            Err(e) => error!("LOGS | Failed to serialize record, dropping it: {}", e),
        }
    }

    fn attempt_deliver(&mut self, payload: Payload) {
        if self.state.should_buffer() {
            self.buffer.add(payload);
            // Nothing will drain the buffer unless a flush cycle is pending
            if self.state.flush == FlushPhase::Idle {
                self.schedule_flush();
            }
            return;
        }

        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = transport.send(&payload).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(SinkCommand::DeliveryFinished { payload, result });
            }
        });
    }

    fn on_delivery_finished(&mut self, payload: Payload, result: Result<(), TransportError>) {
        let error = match result {
            Ok(()) => {
                self.backoff.reset();
                self.state.enabled = true;
                return;
            }
            Err(e) => classify(e),
        };

        if self.state.shutting_down {
            warn!("LOGS | Delivery failed during shutdown, dropping payload: {}", error);
            self.events.publish(SinkEvent::Error(error));
            return;
        }

        self.state.erroring = true;
        self.buffer.add(payload);
        error!("LOGS | Failed to deliver log ({}): {}", error.kind(), error);
        self.events.publish(SinkEvent::Error(error));
        self.state.erroring = false;

        self.schedule_flush();
    }

    /// Arms a reconnect unless a flush cycle is already pending or running.
    fn schedule_flush(&mut self) {
        if self.state.shutting_down || self.state.flush != FlushPhase::Idle {
            return;
        }
        self.state.flush = FlushPhase::Scheduled;

        let tx = self.tx.clone();
        self.backoff.schedule_reconnect(move || {
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(SinkCommand::ReconnectFired);
            }
        });
    }

    fn flush(&mut self) {
        if self.state.flush == FlushPhase::Scheduled {
            self.state.flush = FlushPhase::Idle;
        }

        if self.state.shutting_down
            || self.state.erroring
            || self.state.flush == FlushPhase::InFlight
            || self.buffer.is_empty()
        {
            debug!("LOGS | Skipping flush");
            return;
        }

        self.start_flush();
    }

    fn start_flush(&mut self) {
        let payloads = self.buffer.flush();
        self.state.flush = FlushPhase::InFlight;
        debug!("LOGS | Flushing {} buffered payloads", payloads.len());

        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut set = JoinSet::new();
            for payload in payloads {
                let transport = Arc::clone(&transport);
                set.spawn(async move {
                    let result = transport.send(&payload).await;
                    (payload, result)
                });
            }

            let mut failed = Vec::new();
            let mut delivered = 0;
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((_, Ok(()))) => delivered += 1,
                    Ok((payload, Err(e))) => {
                        debug!("LOGS | Redelivery failed: {}", e);
                        failed.push(payload);
                    }
                    Err(e) => error!("LOGS | Redelivery task failed, payload lost: {}", e),
                }
            }

            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(SinkCommand::FlushFinished { failed, delivered });
            }
        });
    }

    fn on_flush_finished(&mut self, failed: Vec<Payload>, delivered: usize) {
        self.state.flush = FlushPhase::Idle;

        if self.state.shutting_down {
            let all_delivered = failed.is_empty();
            for payload in failed {
                self.buffer.add(payload);
            }
            if !self.final_flush_started && !self.buffer.is_empty() {
                self.start_final_flush();
                return;
            }
            if all_delivered && delivered > 0 {
                self.on_drained(delivered);
            }
            let dropped = self.buffer.flush().len();
            if dropped > 0 {
                let error = SinkError::ResendFailed { failed: dropped };
                warn!("LOGS | Final flush incomplete, dropping {} payloads", dropped);
                self.events.publish(SinkEvent::Error(error));
            }
            self.finish_close();
            return;
        }

        if failed.is_empty() {
            self.on_drained(delivered);

            // Payloads buffered while the flush was running
            if !self.buffer.is_empty() {
                self.start_flush();
            }
            return;
        }

        let count = failed.len();
        for payload in failed {
            self.buffer.add(payload);
        }
        let error = SinkError::ResendFailed { failed: count };
        error!("LOGS | {} ({} delivered)", error, delivered);
        self.events.publish(SinkEvent::Error(error));
        self.schedule_flush();
    }

    fn on_drained(&mut self, delivered: usize) {
        debug!("LOGS | Redelivered {} buffered payloads", delivered);
        self.backoff.reset();
        self.state.enabled = true;
        self.events.publish(SinkEvent::Drained);
    }

    fn on_exhausted(&mut self) {
        let attempts = self.backoff.state().total_retries;
        self.state.enabled = false;
        error!("LOGS | {}", SinkError::RetriesExhausted { attempts });
        self.events.publish(SinkEvent::Exhausted { attempts });
    }

    fn close(&mut self, done: oneshot::Sender<()>) {
        self.close_waiters.push(done);
        if self.state.shutting_down {
            return;
        }

        self.state.shutting_down = true;
        self.backoff.cancel();
        debug!(
            "LOGS | Closing sink with {} buffered payloads",
            self.buffer.len()
        );

        match self.state.flush {
            // Its completion decides whether a final attempt is still needed
            FlushPhase::InFlight => {}
            FlushPhase::Idle | FlushPhase::Scheduled => {
                self.state.flush = FlushPhase::Idle;
                if self.buffer.is_empty() {
                    self.finish_close();
                } else {
                    self.start_final_flush();
                }
            }
        }
    }

    fn start_final_flush(&mut self) {
        self.final_flush_started = true;
        self.start_flush();
    }

    fn finish_close(&mut self) {
        self.closed = true;
        self.events.publish(SinkEvent::Closed);
        for waiter in self.close_waiters.drain(..) {
            let _ = waiter.send(());
        }
        info!("LOGS | Sink closed");
    }
}
