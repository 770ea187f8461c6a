//! Sliding-window rate limiter for externally-visible actions.
//!
//! `acquire()` suspends the caller until one more action fits under the
//! actions-per-minute ceiling. The timestamp deque lives behind a tokio
//! mutex that is held across the wait, so concurrent acquirers are served
//! strictly in arrival order and the window can never burst above the
//! ceiling.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub struct RateLimiter {
    max_actions: usize,
    window: Duration,
    stamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(actions_per_minute: u32) -> Self {
        Self::with_window(actions_per_minute as usize, Duration::from_secs(60))
    }

    pub fn with_window(max_actions: usize, window: Duration) -> Self {
        Self {
            max_actions: max_actions.max(1),
            window,
            stamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Block until one action is permitted, then record it.
    pub async fn acquire(&self) {
        let mut stamps = self.stamps.lock().await;
        loop {
            let now = Instant::now();
            while let Some(&oldest) = stamps.front() {
                if now.duration_since(oldest) >= self.window {
                    stamps.pop_front();
                } else {
                    break;
                }
            }

            if stamps.len() < self.max_actions {
                stamps.push_back(now);
                return;
            }

            // Window is full: sleep until the oldest stamp falls out. The
            // lock stays held so queued acquirers keep their FIFO position.
            let oldest = *stamps.front().expect("window full implies non-empty");
            let wait = self.window - now.duration_since(oldest);
            debug!("Rate limiter: window full, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }
}
