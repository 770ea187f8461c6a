//! Circuit breaker around risky site operations.
//!
//! One breaker is owned by one runner; it is never shared across runners.
//! After `threshold` consecutive failures the breaker opens and `execute`
//! rejects immediately — without invoking the operation — until `cooldown`
//! has elapsed from the moment it opened. The first call after the cooldown
//! is let through (optimistic half-open): a success fully resets the
//! counter, a failure reopens immediately.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::core::errors::AutomationError;

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            state: Mutex::new(BreakerState {
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Run `op` through the breaker.
    ///
    /// Returns `AutomationError::CircuitOpen` without invoking `op` while the
    /// breaker is open; otherwise runs `op` and bookkeeps the outcome,
    /// passing the operation's own error back as `AutomationError::Other`.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, AutomationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        {
            let mut state = self.state.lock().expect("breaker lock poisoned");
            if let Some(opened_at) = state.opened_at {
                let elapsed = opened_at.elapsed();
                if elapsed < self.cooldown {
                    return Err(AutomationError::CircuitOpen {
                        failures: state.consecutive_failures,
                        remaining_secs: (self.cooldown - elapsed).as_secs(),
                    });
                }
                // Cooldown elapsed: let this one call through. A failure
                // below reopens immediately, a success resets everything.
                state.opened_at = None;
            }
        }

        match op().await {
            Ok(value) => {
                let mut state = self.state.lock().expect("breaker lock poisoned");
                state.consecutive_failures = 0;
                state.opened_at = None;
                Ok(value)
            }
            Err(err) => {
                let mut state = self.state.lock().expect("breaker lock poisoned");
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.threshold {
                    state.opened_at = Some(Instant::now());
                    warn!(
                        "Circuit breaker opened after {} consecutive failures (cooldown {}s)",
                        state.consecutive_failures,
                        self.cooldown.as_secs()
                    );
                }
                Err(AutomationError::Other(err))
            }
        }
    }

    pub fn is_open(&self) -> bool {
        let state = self.state.lock().expect("breaker lock poisoned");
        match state.opened_at {
            Some(opened_at) => opened_at.elapsed() < self.cooldown,
            None => false,
        }
    }
}
