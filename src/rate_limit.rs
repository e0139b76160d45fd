//! Sliding-window request throttle shared by callers of one external endpoint.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Admits at most `max_per_window` calls in any trailing window.
///
/// Waiters queue on the inner mutex, so admission is first come, first served.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Limiter over a 60 second window. A limit of 0 disables throttling.
    pub fn per_minute(max_per_minute: u32) -> Self {
        Self::with_window(max_per_minute, RATE_WINDOW)
    }

    pub fn with_window(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_per_window as usize)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_per_window > 0
    }

    /// Wait until a call may proceed, then record it.
    pub async fn acquire(&self) {
        if !self.is_enabled() {
            return;
        }

        let mut timestamps = self.timestamps.lock().await;
        loop {
            let now = Instant::now();
            while let Some(oldest) = timestamps.front() {
                if now.duration_since(*oldest) >= self.window {
                    timestamps.pop_front();
                } else {
                    break;
                }
            }

            if timestamps.len() < self.max_per_window as usize {
                timestamps.push_back(now);
                return;
            }

            if let Some(oldest) = timestamps.front().copied() {
                let wait = (oldest + self.window).saturating_duration_since(now);
                tracing::debug!("Rate limit reached, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
    }
}
