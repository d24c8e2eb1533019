// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

use tick::Clock;
use tokio_util::sync::CancellationToken;

use crate::{Recovery, RecoveryInfo};

/// The reason a [`CallContext`] is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ContextError {
    /// The context was cancelled by its owner or by one of its ancestors.
    #[error("context canceled")]
    Canceled,

    /// The deadline of the context has passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl Recovery for ContextError {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::Canceled => RecoveryInfo::never(),
            Self::DeadlineExceeded => RecoveryInfo::retry(),
        }
    }
}

/// Cancellation and deadline scope of a single outbound call.
///
/// A `CallContext` is created by the caller and handed down to every resilience component and,
/// eventually, to the operation that performs I/O. Derived contexts form a tree:
///
/// - Cancelling a context cancels all contexts derived from it, never its parent.
/// - A derived context inherits the parent deadline and can only make it sooner.
///
/// Operations are expected to observe the context they receive, either by checking
/// [`err`][Self::err] between steps or by racing their work against [`done`][Self::done].
///
/// # Examples
///
/// ```rust
/// # use std::time::Duration;
/// # use tick::Clock;
/// use breakwater::{CallContext, ContextError};
///
/// # fn example(clock: &Clock) {
/// let request = CallContext::new(clock).with_timeout(Duration::from_secs(5));
/// let attempt = request.with_timeout(Duration::from_secs(60));
///
/// // The attempt cannot outlive the request.
/// assert_eq!(attempt.deadline(), request.deadline());
///
/// request.cancel();
/// assert_eq!(attempt.err(), Some(ContextError::Canceled));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    clock: Clock,
}

impl CallContext {
    /// Creates a root context without a deadline.
    #[must_use]
    pub fn new(clock: impl AsRef<Clock>) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            clock: clock.as_ref().clone(),
        }
    }

    /// Creates a context that is cancelled together with this one and shares its deadline.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            clock: self.clock.clone(),
        }
    }

    /// Creates a derived context whose deadline is at most `timeout` from now.
    ///
    /// If this context already expires sooner, the derived context keeps that earlier deadline.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = self.clock.instant().checked_add(timeout);

        match deadline {
            Some(deadline) => self.with_deadline(deadline),
            // the requested deadline is beyond what `Instant` can represent, so it never fires
            None => self.child(),
        }
    }

    /// Creates a derived context that expires at `deadline` or at this context's deadline,
    /// whichever comes first.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.child();
        child.deadline = Some(self.deadline.map_or(deadline, |current| current.min(deadline)));
        child
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` if this context was cancelled.
    ///
    /// An expired deadline does not count as cancellation; see [`err`][Self::err].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the deadline of this context, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left until the deadline, or `None` when there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(self.clock.instant()))
    }

    /// Returns the reason this context is done, or `None` while it is still active.
    #[must_use]
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Canceled);
        }

        match self.deadline {
            Some(deadline) if self.clock.instant() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Waits until this context is done and returns the reason.
    ///
    /// When cancellation and deadline expiry are observed together, cancellation wins.
    pub async fn done(&self) -> ContextError {
        let Some(remaining) = self.remaining() else {
            self.token.cancelled().await;
            return ContextError::Canceled;
        };

        tokio::select! {
            biased;
            () = self.token.cancelled() => ContextError::Canceled,
            () = self.clock.delay(remaining) => ContextError::DeadlineExceeded,
        }
    }

    pub(crate) fn clock(&self) -> &Clock {
        &self.clock
    }
}
