//! Rate limiter for outbound Bot API messages.
//!
//! Spaces sends by a minimum interval so a notification burst stays under
//! Telegram's flood limits.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Rate limiter that enforces minimum intervals between operations.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum duration between allowed operations.
    min_interval: Duration,

    /// Earliest instant the next operation may start.
    next_allowed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the specified minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_allowed: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until an operation is allowed, then reserves the next slot.
    ///
    /// Concurrent callers are served one slot apart. Returns the duration
    /// waited (0 if no wait was needed).
    pub async fn wait_and_acquire(&self) -> Duration {
        let slot = {
            let mut next = self.next_allowed.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |at| at.max(now));
            *next = Some(slot + self.min_interval);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!("Rate limiter: waiting {:?} before next send", wait);
            tokio::time::sleep_until(slot).await;
        }
        wait
    }

    /// Pushes the next slot out by `pause`, e.g. after Telegram asked the
    /// bot to slow down.
    pub async fn pause_for(&self, pause: Duration) {
        let mut next = self.next_allowed.lock().await;
        let until = Instant::now() + pause;
        *next = Some(next.map_or(until, |at| at.max(until)));
    }

    /// Returns the time remaining until the next operation is allowed.
    pub async fn time_until_allowed(&self) -> Duration {
        let next = self.next_allowed.lock().await;
        next.map_or(Duration::ZERO, |at| at.saturating_duration_since(Instant::now()))
    }
}
