// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;

/// The state of a [`CircuitBreaker`][super::CircuitBreaker].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CircuitState {
    /// Calls are allowed and failures are counted.
    #[default]
    Closed = 0,

    /// Calls are allowed as probes. A single failure reopens the circuit.
    HalfOpen = 1,

    /// Calls are rejected until the open timeout elapses.
    Open = 2,
}

impl CircuitState {
    /// Returns the `snake_case` name of the state, as used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::HalfOpen => "half_open",
            Self::Open => "open",
        }
    }

    /// Returns the value reported by the circuit breaker state gauge.
    #[must_use]
    pub fn as_gauge_value(self) -> u64 {
        u64::from(self as u8)
    }

    pub(super) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::HalfOpen,
            2 => Self::Open,
            _ => Self::Closed,
        }
    }
}

impl Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
