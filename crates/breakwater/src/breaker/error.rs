// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::time::Duration;

use crate::{Recovery, RecoveryInfo};

/// Returned when a circuit breaker is open and not yet eligible for a probe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker '{name}' is open")]
pub struct CircuitOpenError {
    name: Cow<'static, str>,
    retry_after: Duration,
}

impl CircuitOpenError {
    pub(crate) fn new(name: impl Into<Cow<'static, str>>, retry_after: Duration) -> Self {
        Self {
            name: name.into(),
            retry_after,
        }
    }

    /// Returns the name of the circuit breaker that rejected the call.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns how long until the circuit breaker allows a probe.
    #[must_use]
    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }
}

impl Recovery for CircuitOpenError {
    fn recovery(&self) -> RecoveryInfo {
        RecoveryInfo::unavailable().delay(self.retry_after)
    }
}

/// The error returned by [`CircuitBreaker::execute`][super::CircuitBreaker::execute].
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError<E> {
    /// The circuit breaker rejected the call; the operation did not run.
    #[error("call rejected by circuit breaker")]
    Open(#[source] CircuitOpenError),

    /// The operation ran and failed.
    #[error("operation failed")]
    Operation(#[source] E),
}

impl<E> ExecuteError<E> {
    /// Returns `true` if the call was rejected by an open circuit.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// Returns the operation error, if the operation ran.
    #[must_use]
    pub fn operation(&self) -> Option<&E> {
        match self {
            Self::Operation(error) => Some(error),
            Self::Open(_) => None,
        }
    }

    /// Converts into the operation error, if the operation ran.
    #[must_use]
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(error) => Some(error),
            Self::Open(_) => None,
        }
    }
}

impl<E: Recovery> Recovery for ExecuteError<E> {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::Open(error) => error.recovery(),
            Self::Operation(error) => error.recovery(),
        }
    }
}
