// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::backoff::{self, Backoff, DEFAULT_JITTER, DEFAULT_MULTIPLIER};

pub(crate) const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub(crate) const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
pub(crate) const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// How often and how quickly a [`Retryer`][super::Retryer] re-attempts a failed operation.
///
/// The policy is plain data. Out-of-range values are replaced by their defaults when a
/// retryer is created; see [`normalized`][Self::normalized].
///
/// # Examples
///
/// ```rust
/// # use std::time::Duration;
/// use breakwater::retry::RetryPolicy;
///
/// let policy = RetryPolicy::default()
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(50))
///     .jitter(0.0);
///
/// assert_eq!(policy.max_attempts, 5);
/// assert_eq!(policy.max_delay, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Upper bound of the unjittered delay.
    pub max_delay: Duration,

    /// Growth factor of the delay between consecutive retries.
    pub multiplier: f64,

    /// Fraction of the delay, in `[0, 1]`, by which each delay is randomly moved up or down.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Sets the total number of attempts, including the first one.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sets the upper bound of the unjittered delay.
    #[must_use]
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the growth factor of the delay.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter fraction. Use `0.0` for deterministic delays.
    #[must_use]
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns a copy with out-of-range values replaced by their defaults.
    ///
    /// - `max_attempts` of zero becomes 3.
    /// - `jitter` outside `[0, 1]` becomes 0.25.
    /// - `multiplier` that is not finite or below `1.0` becomes 2.0.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            max_attempts: if self.max_attempts == 0 {
                DEFAULT_MAX_ATTEMPTS
            } else {
                self.max_attempts
            },
            multiplier: backoff::normalize_multiplier(self.multiplier),
            jitter: backoff::normalize_jitter(self.jitter),
            ..self
        }
    }

    /// Returns the backoff calculator for this policy.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.base_delay, self.max_delay, self.multiplier, self.jitter)
    }
}
