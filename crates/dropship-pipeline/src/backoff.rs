//! Retry policy for failed job attempts.

use std::time::Duration;

use dropship_core::ErrorKind;

/// Upper bound on the fraction of the capped delay added as jitter.
const JITTER_FRACTION: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

/// What to do with a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    Fail,
    /// Leave the job where it is; shutdown recovery will requeue it.
    Abandon,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            cap,
        }
    }

    /// Decides the fate of a job whose attempt number `attempts` failed with
    /// an error of `kind`. `retry_after` is a minimum delay requested by the
    /// source, if any.
    #[must_use]
    pub fn decide(
        &self,
        kind: ErrorKind,
        attempts: u32,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        match kind {
            ErrorKind::Cancelled => RetryDecision::Abandon,
            ErrorKind::InvalidInput | ErrorKind::Permanent => RetryDecision::Fail,
            ErrorKind::Transient if attempts >= self.max_attempts => RetryDecision::Fail,
            ErrorKind::Transient => {
                let prior_retries = attempts.saturating_sub(1);
                let delay = self.delay_with_jitter(prior_retries, rand::random::<f64>());
                RetryDecision::Retry {
                    delay: retry_after.map_or(delay, |min| delay.max(min)),
                }
            }
        }
    }

    /// `min(base * 2^n, cap)` for the `n`-th retry (0-based).
    #[must_use]
    pub fn capped_delay(&self, prior_retries: u32) -> Duration {
        let factor = 1u32.checked_shl(prior_retries.min(31)).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.cap)
    }

    /// Capped delay plus `unit * 25%` of it. `unit` is clamped to `[0, 1]`.
    #[must_use]
    pub fn delay_with_jitter(&self, prior_retries: u32, unit: f64) -> Duration {
        let capped = self.capped_delay(prior_retries);
        let jitter = capped.mul_f64(unit.clamp(0.0, 1.0) * JITTER_FRACTION);
        capped + jitter
    }
}
