// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::time::Duration;

use crate::{ContextError, Recovery, RecoveryInfo};

/// Returned when the deadline imposed by a [`TimeoutManager`][super::TimeoutManager] elapses.
///
/// An expired or cancelled caller context is reported as [`ContextError`] instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("operation '{label}' timed out after {timeout:?}")]
pub struct TimeoutError {
    label: Cow<'static, str>,
    timeout: Duration,
}

impl TimeoutError {
    pub(crate) fn new(label: impl Into<Cow<'static, str>>, timeout: Duration) -> Self {
        Self {
            label: label.into(),
            timeout,
        }
    }

    /// Returns the label of the operation that timed out.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the timeout that elapsed.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Recovery for TimeoutError {
    fn recovery(&self) -> RecoveryInfo {
        RecoveryInfo::retry()
    }
}

/// The error returned by [`TimeoutManager::execute`][super::TimeoutManager::execute].
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError<E> {
    /// The deadline imposed by the manager elapsed before the operation finished.
    #[error("operation timed out")]
    TimedOut(#[source] TimeoutError),

    /// The caller context was cancelled or reached its own, sooner deadline.
    #[error("caller context is done")]
    Context(#[source] ContextError),

    /// The operation finished with an error.
    #[error("operation failed")]
    Operation(#[source] E),
}

impl<E> ExecuteError<E> {
    /// Returns `true` if the manager's own deadline elapsed.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }

    /// Returns the operation error, if the operation finished with one.
    #[must_use]
    pub fn operation(&self) -> Option<&E> {
        match self {
            Self::Operation(error) => Some(error),
            _ => None,
        }
    }

    /// Converts into the operation error, if the operation finished with one.
    #[must_use]
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(error) => Some(error),
            _ => None,
        }
    }
}

impl<E: Recovery> Recovery for ExecuteError<E> {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::TimedOut(error) => error.recovery(),
            Self::Context(error) => error.recovery(),
            Self::Operation(error) => error.recovery(),
        }
    }
}
