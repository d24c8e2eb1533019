// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Arguments for the [`on_timeout`][super::TimeoutManager::on_timeout] callback function.
#[derive(Debug)]
#[non_exhaustive]
pub struct OnTimeoutArgs<'a> {
    pub(super) label: &'a str,
    pub(super) timeout: Duration,
}

impl OnTimeoutArgs<'_> {
    /// Returns the label of the operation that timed out.
    #[must_use]
    pub fn label(&self) -> &str {
        self.label
    }

    /// Returns the timeout that elapsed.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
