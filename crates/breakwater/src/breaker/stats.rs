// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::CircuitState;

/// A point-in-time snapshot of a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct CircuitBreakerStats {
    pub(super) name: String,
    pub(super) state: CircuitState,
    pub(super) failures: u32,
    pub(super) half_open_successes: u32,
    pub(super) since_last_failure: Option<Duration>,
    pub(super) since_state_change: Duration,
}

impl CircuitBreakerStats {
    /// Returns the name of the circuit breaker.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the state at the time of the snapshot.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Returns the number of consecutive failures counted in the closed state.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Returns the number of successful probes counted in the half-open state.
    #[must_use]
    pub fn half_open_successes(&self) -> u32 {
        self.half_open_successes
    }

    /// Returns the time since the last recorded failure, or `None` if there was none.
    #[must_use]
    pub fn since_last_failure(&self) -> Option<Duration> {
        self.since_last_failure
    }

    /// Returns the time since the last state change, or since creation.
    #[must_use]
    pub fn since_state_change(&self) -> Duration {
        self.since_state_change
    }
}
