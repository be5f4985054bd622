//! Fixed-window request throttle shared by every caller on one endpoint.
//!
//! Each chain owns one throttle per endpoint class (explorer, RPC). Callers
//! `acquire()` before issuing a request; when the window is exhausted the
//! calling task sleeps until the window rolls over without blocking others.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Window accounting guarded by the throttle's mutex.
#[derive(Debug)]
struct Window {
    started: Instant,
    used: u32,
}

/// Admits at most `max_requests` per `window`.
#[derive(Debug)]
pub struct Throttle {
    name: String,
    max_requests: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl Throttle {
    /// Create a throttle admitting `max_requests` per `window`.
    ///
    /// A zero request count is treated as one so the throttle can never
    /// stall forever.
    pub fn new(name: impl Into<String>, max_requests: u32, window: Duration) -> Self {
        Self {
            name: name.into(),
            max_requests: max_requests.max(1),
            window,
            state: Mutex::new(Window {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Throttle name (used in logs).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requests admitted per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait for a slot in the current window.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                let now = Instant::now();
                if now.duration_since(state.started) >= self.window {
                    state.started = now;
                    state.used = 0;
                }
                if state.used < self.max_requests {
                    state.used += 1;
                    return;
                }
                (state.started + self.window).saturating_duration_since(now)
            };

            trace!(throttle = %self.name, wait_ms = wait.as_millis() as u64, "Throttled");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_limit_without_waiting() {
        let throttle = Throttle::new("explorer", 4, Duration::from_millis(1100));
        let start = Instant::now();
        for _ in 0..4 {
            throttle.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifth_request_waits_for_next_window() {
        let throttle = Throttle::new("explorer", 4, Duration::from_millis(1100));
        let start = Instant::now();
        for _ in 0..5 {
            throttle.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(1100));
        assert!(start.elapsed() < Duration::from_millis(2200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_budget() {
        let throttle = Arc::new(Throttle::new("rpc", 2, Duration::from_secs(1)));
        let start = Instant::now();

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let throttle = throttle.clone();
                tokio::spawn(async move { throttle.acquire().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        // 6 requests at 2 per second need three windows
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let throttle = Throttle::new("broken", 0, Duration::from_secs(1));
        assert_eq!(throttle.max_requests(), 1);
    }
}
