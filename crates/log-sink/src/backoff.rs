// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One-shot reconnect scheduling with exponential backoff.
//!
//! Every call to [`BackoffScheduler::schedule_reconnect`] arms exactly one
//! delayed callback using the delay current at arm time. When it fires:
//!
//! 1. `retry_count` and `total_retries` are incremented.
//! 2. Once `retry_count` reaches `decay_threshold` the delay doubles (capped
//!    at `max_delay`) and `retry_count` starts over.
//! 3. Once `total_retries` reaches `max_attempts` the exhaustion callback runs.
//!    Counters only go back to zero through [`BackoffScheduler::reset`], so it
//!    runs again on every later fire.
//! 4. The armed callback runs, exhausted or not.
//!
//! The scheduler never re-arms itself; callers decide whether to retry again.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::constants;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub decay_threshold: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            decay_threshold: constants::DEFAULT_DECAY_THRESHOLD,
            initial_delay: constants::DEFAULT_INITIAL_DELAY,
            max_delay: constants::DEFAULT_MAX_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffState {
    pub retry_count: u32,
    pub total_retries: u32,
    pub current_delay: Duration,
}

impl BackoffState {
    fn initial(config: &BackoffConfig) -> Self {
        BackoffState {
            retry_count: 0,
            total_retries: 0,
            current_delay: config.initial_delay,
        }
    }

    /// Applies one fired reconnect. Returns true when the retry budget is spent.
    fn record_fire(&mut self, config: &BackoffConfig) -> bool {
        self.retry_count = self.retry_count.saturating_add(1);
        self.total_retries = self.total_retries.saturating_add(1);

        if self.retry_count >= config.decay_threshold && self.current_delay < config.max_delay {
            self.current_delay = self.current_delay.saturating_mul(2).min(config.max_delay);
            self.retry_count = 0;
        }

        self.total_retries >= config.max_attempts
    }
}

type ExhaustedFn = Arc<dyn Fn() + Send + Sync>;

pub struct BackoffScheduler {
    config: BackoffConfig,
    state: Arc<Mutex<BackoffState>>,
    on_exhausted: ExhaustedFn,
    cancel_token: CancellationToken,
}

impl BackoffScheduler {
    pub fn new<F>(config: BackoffConfig, on_exhausted: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        BackoffScheduler {
            state: Arc::new(Mutex::new(BackoffState::initial(&config))),
            config,
            on_exhausted: Arc::new(on_exhausted),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Arms a single delayed invocation of `callback`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_reconnect<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = self.current_delay();
        let config = self.config;
        let state = Arc::clone(&self.state);
        let on_exhausted = Arc::clone(&self.on_exhausted);
        let cancel_token = self.cancel_token.clone();

        debug!("LOGS | Reconnect scheduled in {} ms", delay.as_millis());

        tokio::spawn(async move {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    debug!("LOGS | Scheduled reconnect cancelled");
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }

            let (exhausted, total_retries) = {
                let mut state = lock(&state);
                let exhausted = state.record_fire(&config);
                (exhausted, state.total_retries)
            };

            if exhausted {
                warn!(
                    "LOGS | Reconnect attempts exhausted after {} retries",
                    total_retries
                );
                (on_exhausted)();
            }

            callback();
        })
    }

    pub fn reset(&self) {
        *lock(&self.state) = BackoffState::initial(&self.config);
    }

    /// Cancels every armed reconnect. Later arms are cancelled immediately.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn state(&self) -> BackoffState {
        *lock(&self.state)
    }

    /// Delay the next armed reconnect will wait for.
    #[must_use]
    pub fn current_delay(&self) -> Duration {
        lock(&self.state).current_delay
    }
}

impl fmt::Debug for BackoffScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffScheduler")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock(state: &Mutex<BackoffState>) -> MutexGuard<'_, BackoffState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
