// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Exponential backoff with symmetric jitter.
//!
//! The delay before retry `n` (1-indexed, so the first retry uses `n = 1`) is
//!
//! ```text
//! delay(n) = min(base_delay * multiplier^(n - 1), max_delay)
//! ```
//!
//! Jitter then moves the delay uniformly within `delay ± delay * jitter`. A result that would
//! collapse to zero falls back to the unjittered delay. With `jitter = 0` every delay is
//! deterministic.
//!
//! # Examples
//!
//! ```rust
//! # use std::time::Duration;
//! use breakwater::backoff::Backoff;
//!
//! let backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(100), 2.0, 0.0);
//!
//! assert_eq!(backoff.delay(1), Duration::from_millis(10));
//! assert_eq!(backoff.delay(2), Duration::from_millis(20));
//! assert_eq!(backoff.delay(5), Duration::from_millis(100));
//! assert_eq!(backoff.jittered(3), Duration::from_millis(40));
//! ```

use std::time::Duration;

use crate::rnd::Rnd;

pub(crate) const DEFAULT_MULTIPLIER: f64 = 2.0;
pub(crate) const DEFAULT_JITTER: f64 = 0.25;

/// Computes the delays between retry attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
    rnd: Rnd,
}

impl Backoff {
    /// Creates a calculator.
    ///
    /// A `multiplier` that is not finite or below `1.0` is replaced by `2.0`, and a `jitter`
    /// outside `[0, 1]` is replaced by `0.25`.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            base_delay,
            max_delay,
            multiplier: normalize_multiplier(multiplier),
            jitter: normalize_jitter(jitter),
            rnd: Rnd::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_rnd(mut self, rnd: Rnd) -> Self {
        self.rnd = rnd;
        self
    }

    /// Returns the unjittered delay before retry `attempt`, capped at the maximum delay.
    ///
    /// `attempt` is 1-indexed; `0` is treated as `1`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);

        secs_to_duration_saturating(secs).min(self.max_delay)
    }

    /// Returns the delay before retry `attempt` with jitter applied.
    ///
    /// The result is not capped again after jitter, so it can exceed the maximum delay by up
    /// to `max_delay * jitter`.
    #[must_use]
    pub fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);

        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }

        let secs = delay.as_secs_f64();
        let offset = secs * self.jitter * 2.0_f64.mul_add(self.rnd.next_f64(), -1.0);
        let jittered = secs + offset;

        if jittered <= 0.0 {
            return delay;
        }

        secs_to_duration_saturating(jittered)
    }
}

pub(crate) fn normalize_multiplier(multiplier: f64) -> f64 {
    if multiplier.is_finite() && multiplier >= 1.0 {
        multiplier
    } else {
        DEFAULT_MULTIPLIER
    }
}

pub(crate) fn normalize_jitter(jitter: f64) -> f64 {
    if (0.0..=1.0).contains(&jitter) {
        jitter
    } else {
        DEFAULT_JITTER
    }
}

fn secs_to_duration_saturating(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
