// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Retrying of transient failures with exponential backoff.
//!
//! A [`Retryer`] runs an operation up to [`max_attempts`][RetryPolicy::max_attempts] times.
//! After a failed attempt it:
//!
//! 1. stops immediately if the caller context is done, returning [`RetryError::Context`];
//! 2. stops if this was the last attempt or the error is not retryable, returning
//!    [`RetryError::Operation`] with the last error;
//! 3. otherwise waits for the [backoff][crate::backoff] delay and tries again. The wait ends
//!    early if the caller context becomes done.
//!
//! Whether an error is retryable is decided by [`classify`][crate::classify::classify]
//! unless a [`retry_if`][Retryer::retry_if] predicate replaces that decision.
//!
//! # Telemetry
//!
//! Every attempt is recorded as a call with its duration and status, every retry increments the
//! retry counter and the final error is recorded with its classification label. With the `logs`
//! feature, retries emit `breakwater.retry` events and exhausted attempts emit
//! `breakwater.retry.exhausted`.

mod args;
mod error;
mod policy;
mod retryer;

pub use args::OnRetryArgs;
pub use error::RetryError;
pub use policy::RetryPolicy;
pub use retryer::Retryer;
