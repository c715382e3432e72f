//! Global request rate limiter
//!
//! One instance is shared by every lookup worker. Each `wait()` reserves the
//! next free slot (at least `interval` after the previous one) under the lock,
//! releases the lock, then sleeps until its slot. The lock covers only the
//! compare-and-advance, never the sleep or the network call.

use pcr_common::{Error, Result};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum-interval limiter shared across workers
#[derive(Debug)]
pub struct RateLimiter {
    next_allowed: Mutex<Option<Instant>>,
    interval: Duration,
}

impl RateLimiter {
    /// Limiter permitting `rate_per_sec` requests per second
    pub fn new(rate_per_sec: f64) -> Result<Self> {
        if !(rate_per_sec > 0.0) || !rate_per_sec.is_finite() {
            return Err(Error::Config(format!(
                "rate_per_sec must be a positive number (got {})",
                rate_per_sec
            )));
        }
        let interval = Duration::try_from_secs_f64(1.0 / rate_per_sec).map_err(|e| {
            Error::Config(format!("rate_per_sec {} is out of range: {}", rate_per_sec, e))
        })?;
        Ok(Self::with_interval(interval))
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            next_allowed: Mutex::new(None),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until this caller may issue a request.
    ///
    /// Returns the instant the caller was permitted at.
    pub async fn wait(&self) -> Instant {
        let slot = {
            let mut next = self.next_allowed.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(allowed) if allowed > now => allowed,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };

        if slot > Instant::now() {
            tracing::trace!("Rate limiting: waiting {:?}", slot - Instant::now());
            tokio::time::sleep_until(slot).await;
        }

        slot
    }
}
