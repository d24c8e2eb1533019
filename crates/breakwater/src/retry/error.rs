// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::{ContextError, Recovery, RecoveryInfo};

/// The error returned by [`Retryer::execute`][super::Retryer::execute].
///
/// The error of the last attempt stays reachable through [`source`][std::error::Error::source]
/// and [`operation`][Self::operation], so callers can inspect its concrete type.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The last attempt failed and no further attempt was made, either because the error is
    /// not retryable or because all attempts were used.
    #[error("operation failed after {attempts} attempt(s)")]
    Operation {
        /// Number of attempts made.
        attempts: u32,
        /// The error of the last attempt.
        #[source]
        source: E,
    },

    /// The caller context was cancelled or expired.
    #[error("retrying stopped after {attempts} attempt(s) because the caller context is done")]
    Context {
        /// Number of attempts made.
        attempts: u32,
        /// Why the caller context is done.
        #[source]
        source: ContextError,
    },
}

impl<E> RetryError<E> {
    /// Returns the number of attempts made.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Operation { attempts, .. } | Self::Context { attempts, .. } => *attempts,
        }
    }

    /// Returns the error of the last attempt, unless retrying stopped because of the caller
    /// context.
    #[must_use]
    pub fn operation(&self) -> Option<&E> {
        match self {
            Self::Operation { source, .. } => Some(source),
            Self::Context { .. } => None,
        }
    }

    /// Converts into the error of the last attempt, unless retrying stopped because of the
    /// caller context.
    #[must_use]
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation { source, .. } => Some(source),
            Self::Context { .. } => None,
        }
    }

    /// Returns the context error, if retrying stopped because of the caller context.
    #[must_use]
    pub fn context(&self) -> Option<ContextError> {
        match self {
            Self::Context { source, .. } => Some(*source),
            Self::Operation { .. } => None,
        }
    }
}

impl<E: Recovery> Recovery for RetryError<E> {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::Operation { source, .. } => source.recovery(),
            Self::Context { source, .. } => source.recovery(),
        }
    }
}
