// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::CircuitState;

/// Arguments for the [`on_state_change`][super::CircuitBreaker::on_state_change] callback function.
///
/// Provides context when a circuit breaker moves from one state to another.
#[derive(Debug)]
#[non_exhaustive]
pub struct OnStateChangeArgs<'a> {
    pub(super) name: &'a str,
    pub(super) from: CircuitState,
    pub(super) to: CircuitState,
}

impl OnStateChangeArgs<'_> {
    /// Returns the name of the circuit breaker.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    /// Returns the state the circuit breaker left.
    #[must_use]
    pub fn from(&self) -> CircuitState {
        self.from
    }

    /// Returns the state the circuit breaker entered.
    #[must_use]
    pub fn to(&self) -> CircuitState {
        self.to
    }
}
