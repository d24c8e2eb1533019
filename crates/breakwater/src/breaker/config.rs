// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

pub(crate) const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub(crate) const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_HALF_OPEN_REQUIRED_SUCCESSES: u32 = 1;

/// Configuration of a [`CircuitBreaker`][super::CircuitBreaker].
///
/// Zero counts are replaced by their defaults when a breaker is created; see
/// [`normalized`][Self::normalized].
///
/// # Examples
///
/// ```rust
/// # use std::time::Duration;
/// use breakwater::breaker::CircuitBreakerConfig;
///
/// let config = CircuitBreakerConfig::default()
///     .failure_threshold(3)
///     .open_timeout(Duration::from_secs(10));
///
/// assert_eq!(config.failure_threshold, 3);
/// assert_eq!(config.half_open_required_successes, 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in the closed state that open the circuit.
    pub failure_threshold: u32,

    /// How long the circuit stays open after the last failure before a probe is allowed.
    pub open_timeout: Duration,

    /// Successful probes in the half-open state that close the circuit.
    pub half_open_required_successes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            half_open_required_successes: DEFAULT_HALF_OPEN_REQUIRED_SUCCESSES,
        }
    }
}

impl CircuitBreakerConfig {
    /// Sets the number of consecutive failures that open the circuit.
    #[must_use]
    pub fn failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.failure_threshold = failure_threshold;
        self
    }

    /// Sets how long the circuit stays open before a probe is allowed.
    #[must_use]
    pub fn open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }

    /// Sets the number of successful probes that close the circuit.
    #[must_use]
    pub fn half_open_required_successes(mut self, half_open_required_successes: u32) -> Self {
        self.half_open_required_successes = half_open_required_successes;
        self
    }

    /// Returns a copy with zero counts replaced by their defaults.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            failure_threshold: if self.failure_threshold == 0 {
                DEFAULT_FAILURE_THRESHOLD
            } else {
                self.failure_threshold
            },
            open_timeout: self.open_timeout,
            half_open_required_successes: if self.half_open_required_successes == 0 {
                DEFAULT_HALF_OPEN_REQUIRED_SUCCESSES
            } else {
                self.half_open_required_successes
            },
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CircuitBreakerConfig::default();

        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.open_timeout, Duration::from_secs(30));
        assert_eq!(config.half_open_required_successes, 1);
    }

    #[test]
    fn builder() {
        let config = CircuitBreakerConfig::default()
            .failure_threshold(2)
            .open_timeout(Duration::from_millis(100))
            .half_open_required_successes(3);

        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.open_timeout, Duration::from_millis(100));
        assert_eq!(config.half_open_required_successes, 3);
    }

    #[test]
    fn normalized_replaces_zero_counts() {
        let config = CircuitBreakerConfig::default()
            .failure_threshold(0)
            .open_timeout(Duration::ZERO)
            .half_open_required_successes(0)
            .normalized();

        assert_eq!(config.failure_threshold, DEFAULT_FAILURE_THRESHOLD);
        assert_eq!(config.half_open_required_successes, DEFAULT_HALF_OPEN_REQUIRED_SUCCESSES);
        assert_eq!(config.open_timeout, Duration::ZERO);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize_fills_defaults() {
        let config: CircuitBreakerConfig = serde_json::from_str(r#"{ "failure_threshold": 2 }"#).unwrap();

        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.open_timeout, DEFAULT_OPEN_TIMEOUT);
        assert_eq!(config.half_open_required_successes, 1);
    }
}
