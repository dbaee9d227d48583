//! Trailing-edge throttle for reload callbacks.
//!
//! # Behavior
//! ```text
//! call() with >= delay since last execution → run now
//! call() inside the window                  → (re)schedule one run at window end
//!                                              replacing any pending callback
//! cancel()                                   → abort the pending run
//! ```
//! Pending callbacks are discarded, never queued: the most recent one wins.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct ThrottleState {
    last_execution: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    /// Bumped by every `call` and `cancel`; a deferred run only fires if it
    /// still holds the latest generation.
    generation: u64,
}

/// Rate-limits a stream of callbacks to at most one execution per `delay`.
#[derive(Debug, Clone)]
pub struct Throttle {
    delay: Duration,
    state: Arc<Mutex<ThrottleState>>,
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Arc::new(Mutex::new(ThrottleState::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Submit a callback. Must be called from within a Tokio runtime.
    pub fn call<F, Fut>(&self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock().expect("throttle mutex poisoned");
        let now = Instant::now();

        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let remaining = match state.last_execution {
            Some(last) => self.delay.saturating_sub(now.duration_since(last)),
            None => Duration::ZERO,
        };

        if remaining.is_zero() {
            state.last_execution = Some(now);
            drop(state);
            tokio::spawn(callback());
            return;
        }

        tracing::trace!(remaining_ms = remaining.as_millis() as u64, "Throttled, deferring callback");
        let shared = Arc::clone(&self.state);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            {
                let mut state = shared.lock().expect("throttle mutex poisoned");
                if state.generation != generation {
                    return;
                }
                state.last_execution = Some(Instant::now());
                state.timer = None;
            }
            callback().await;
        }));
    }

    /// Whether a deferred callback is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.state
            .lock()
            .expect("throttle mutex poisoned")
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Drop the pending callback, if any.
    pub fn cancel(&self) {
        let mut state = self.state.lock().expect("throttle mutex poisoned");
        state.generation = state.generation.wrapping_add(1);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}
