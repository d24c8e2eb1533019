// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error;
use std::time::Duration;

/// Arguments for the [`on_retry`][super::Retryer::on_retry] callback function.
///
/// Provides context for retry notifications.
#[derive(Debug)]
#[non_exhaustive]
pub struct OnRetryArgs<'a> {
    pub(super) attempt: u32,
    pub(super) delay: Duration,
    pub(super) error: &'a (dyn Error + 'static),
}

impl OnRetryArgs<'_> {
    /// Returns the 1-based number of the attempt that just failed.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the delay before the next attempt.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns the error that triggered the retry.
    #[must_use]
    pub fn error(&self) -> &(dyn Error + 'static) {
        self.error
    }
}
