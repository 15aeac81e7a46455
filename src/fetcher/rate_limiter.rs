// src/fetcher/rate_limiter.rs
use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Per-host request pacing: a minimum interval derived from the configured
/// requests-per-minute budget, stretched by a randomized delay within the
/// configured [min, max] window. Hosts do not affect one another.
///
/// Driven by `tokio::time::Instant` so tests can run under a paused clock.
pub struct HostRateLimiter {
    min_interval: Duration,
    min_delay: Duration,
    max_delay: Duration,
    // Next free request slot per host; one writer at a time.
    slots: Mutex<HashMap<String, Instant>>,
}

impl HostRateLimiter {
    pub fn new(max_requests_per_minute: u32, min_delay_seconds: f64, max_delay_seconds: f64) -> Self {
        let rpm = max_requests_per_minute.max(1);
        Self {
            min_interval: Duration::from_secs_f64(60.0 / f64::from(rpm)),
            min_delay: Duration::from_secs_f64(min_delay_seconds.max(0.0)),
            max_delay: Duration::from_secs_f64(max_delay_seconds.max(min_delay_seconds).max(0.0)),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until this host's next request slot. The first request to a host
    /// goes out immediately; successive requests are spaced by at least the
    /// per-minute interval and at least the randomized delay window.
    pub async fn acquire(&self, host: &str) {
        let wait = {
            let mut slots = self.slots.lock().await;
            let now = Instant::now();
            let pace = self.min_interval.max(self.random_delay());
            match slots.get_mut(host) {
                Some(slot) => {
                    let wait = if *slot > now { *slot - now } else { Duration::ZERO };
                    *slot = (*slot).max(now) + pace;
                    wait
                }
                None => {
                    slots.insert(host.to_string(), now + pace);
                    Duration::ZERO
                }
            }
        };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    fn random_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let span = (self.max_delay - self.min_delay).as_secs_f64();
        self.min_delay + Duration::from_secs_f64(fastrand::f64() * span)
    }
}
