// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Deadline-aware timeouts for single attempts.
//!
//! A [`TimeoutManager`] derives an attempt [`CallContext`][crate::CallContext] from the
//! caller's context and races the operation against it. The attempt deadline is the sooner of
//! the requested timeout and any deadline the caller already carries, so an inner timeout can
//! shorten the budget of a call but never extend it.
//!
//! Who wins the race decides the error:
//!
//! - [`ExecuteError::TimedOut`]: the manager's own deadline elapsed.
//! - [`ExecuteError::Context`]: the caller was cancelled, or the caller's sooner deadline
//!   elapsed. The caller's own error is reported unchanged.
//! - [`ExecuteError::Operation`]: the operation completed with an error.
//!
//! [`TimeoutConfig`] carries the default, connect, read and write timeouts for clients that
//! pass them down to their transport.

mod args;
mod config;
mod error;
mod manager;

pub use args::OnTimeoutArgs;
pub use config::TimeoutConfig;
pub use error::{ExecuteError, TimeoutError};
pub use manager::TimeoutManager;
