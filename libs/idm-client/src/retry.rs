//! Caller-side retry for read operations.
//!
//! The search client and the mutation executor never retry. Listing and
//! lookup calls are idempotent, so callers that want resilience against
//! flaky networks can wrap them in [`ReadRetry::run`]. Mutations must not be
//! wrapped: a timed-out secret rotation may already have been applied.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{IdmError, Operation, TransportError};

/// Exponential backoff policy.
///
/// Computes delay as: `min(initial * multiplier^attempt, max)` with optional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    /// Initial backoff duration (default: 200ms)
    pub initial: Duration,

    /// Maximum backoff duration (default: 5s)
    pub max: Duration,

    /// Backoff multiplier for exponential growth (default: 2.0)
    pub multiplier: f64,

    /// Adds a random 0-25% to each delay when enabled (default: true)
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            max: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    /// Fast backoff for tests (1ms initial, 10ms max, no jitter)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(10),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// NaN, infinite or negative settings fall back to safe values.
    #[must_use]
    pub fn delay(&self, attempt: usize) -> Duration {
        const MAX_BACKOFF_SECS: f64 = 3600.0;

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 0.0 {
            self.multiplier
        } else {
            1.0
        };
        let max_secs = self.max.as_secs_f64().min(MAX_BACKOFF_SECS);
        let base = self.initial.as_secs_f64() * multiplier.powi(exponent);
        let clamped = if base.is_finite() {
            base.clamp(0.0, max_secs)
        } else {
            max_secs
        };
        let delay = Duration::from_secs_f64(clamped);

        let delay = if self.jitter {
            delay + delay.mul_f64(rand::rng().random_range(0.0..=0.25))
        } else {
            delay
        };
        delay.min(Duration::from_secs_f64(max_secs))
    }
}

/// Bounded retry loop for idempotent reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRetry {
    /// Retries after the first attempt (default: 3)
    pub max_retries: usize,
    pub backoff: ExponentialBackoff,
}

impl Default for ReadRetry {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff::default(),
        }
    }
}

impl ReadRetry {
    #[must_use]
    pub fn new(max_retries: usize, backoff: ExponentialBackoff) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// No retries at all.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0, ExponentialBackoff::default())
    }

    /// Run `read`, retrying transient transport failures.
    ///
    /// Retried: timeouts, network errors and HTTP 408, 429, 500, 502, 503, 504.
    /// Every other error is returned immediately.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or the first
    /// non-transient error.
    pub fn run<T, F>(&self, what: &str, mut read: F) -> Result<T, IdmError>
    where
        F: FnMut() -> Result<T, IdmError>,
    {
        let mut attempt = 0;
        loop {
            match read() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && is_transient(&err) => {
                    let delay = self.backoff.delay(attempt);
                    attempt += 1;
                    warn!(
                        operation = what,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "read failed, retrying"
                    );
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn is_transient(err: &IdmError) -> bool {
    let IdmError::Transport(transport) = err else {
        return false;
    };
    if !err.safe_to_rerun(Operation::Read) {
        return false;
    }
    match transport {
        TransportError::Status { status, .. } => {
            matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
        }
        _ => true,
    }
}
