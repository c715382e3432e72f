//! Retry backoff policy
//!
//! Pure function of the attempt number and an optional server hint:
//! `min(base * 2^(n-1), cap)` plus up to 20% jitter, capped again at `cap`.
//! A parseable, positive `Retry-After` value (in seconds) replaces the
//! computed delay.

use rand::Rng;
use std::time::Duration;

/// Fraction of the base delay added as random jitter (upper bound)
pub const JITTER_FRACTION: f64 = 0.2;

/// Exponential backoff with jitter
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before jitter for 1-based `attempt`
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let scaled = self.base.as_secs_f64() * 2f64.powi(exponent);
        Duration::from_secs_f64(scaled.min(self.cap.as_secs_f64()))
    }

    /// Delay with an explicit jitter factor in `[0.0, 1.0]` of the allowed jitter
    pub fn delay_with_jitter(&self, attempt: u32, jitter_factor: f64) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let jitter = base * JITTER_FRACTION * jitter_factor.clamp(0.0, 1.0);
        Duration::from_secs_f64((base + jitter).min(self.cap.as_secs_f64()))
    }

    /// Randomly jittered delay for `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = rand::thread_rng().gen_range(0.0..=1.0);
        self.delay_with_jitter(attempt, factor)
    }

    /// Wait duration honoring a server hint when present
    pub fn wait_duration(&self, attempt: u32, retry_hint: Option<&str>) -> Duration {
        retry_hint
            .and_then(parse_retry_after)
            .unwrap_or_else(|| self.delay(attempt))
    }
}

/// Parse a `Retry-After` hint given in seconds.
///
/// Returns `None` unless the value is a number greater than zero that fits
/// in a `Duration`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    if !(seconds > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}
