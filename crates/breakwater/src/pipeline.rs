// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! One-call composition of circuit breaking, retries and timeouts.
//!
//! [`Pipeline::execute`] runs an operation through the three mechanisms in the documented
//! order. Every attempt:
//!
//! 1. asks the circuit breaker for permission and fails with [`PipelineError::Open`] when the
//!    circuit is open, which also ends retrying;
//! 2. runs the operation under the timeout manager;
//! 3. records the outcome on the circuit breaker. Failures caused by the caller's own context,
//!    cancellation or an outer deadline, are not held against the dependency.
//!
//! Failed attempts are retried according to the retryer's policy.
//!
//! # Examples
//!
//! ```rust
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use tick::Clock;
//! use breakwater::breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use breakwater::pipeline::Pipeline;
//! use breakwater::retry::{RetryPolicy, Retryer};
//! use breakwater::timeout::{TimeoutConfig, TimeoutManager};
//! use breakwater::{CallContext, ResilienceContext};
//!
//! # async fn example(clock: Clock) {
//! let context = ResilienceContext::new(&clock).name("billing_client");
//!
//! let pipeline = Pipeline::new(
//!     Arc::new(CircuitBreaker::new("billing", CircuitBreakerConfig::default(), &context)),
//!     Retryer::new(RetryPolicy::default(), &context).with_service("billing", "/invoices"),
//!     TimeoutManager::new(TimeoutConfig::default(), &context),
//! )
//! .attempt_timeout(Duration::from_secs(2));
//!
//! let invoice = pipeline
//!     .execute(&CallContext::new(&clock), "get_invoice", |_attempt_ctx| async {
//!         Ok::<_, std::io::Error>("invoice")
//!     })
//!     .await;
//! # let _ = invoice;
//! # }
//! ```

use std::borrow::Cow;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::{CircuitBreaker, CircuitOpenError};
use crate::retry::{RetryError, Retryer};
use crate::timeout::{self, TimeoutError, TimeoutManager};
use crate::{CallContext, ContextError, Recovery, RecoveryInfo};

/// The error returned by [`Pipeline::execute`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError<E> {
    /// The circuit breaker rejected the attempt.
    #[error("call rejected by circuit breaker")]
    Open(#[source] CircuitOpenError),

    /// The last attempt exceeded its timeout.
    #[error("operation timed out")]
    TimedOut(#[source] TimeoutError),

    /// The caller context was cancelled or reached its deadline.
    #[error("caller context is done")]
    Context(#[source] ContextError),

    /// The last attempt failed with an error of the operation.
    #[error("operation failed")]
    Operation(#[source] E),
}

impl<E> PipelineError<E> {
    /// Returns `true` if the circuit breaker rejected the call.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// Returns `true` if the last attempt timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }

    /// Returns the error of the operation, if the last attempt failed on its own.
    #[must_use]
    pub fn operation(&self) -> Option<&E> {
        match self {
            Self::Operation(error) => Some(error),
            _ => None,
        }
    }

    /// Converts into the error of the operation, if the last attempt failed on its own.
    #[must_use]
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(error) => Some(error),
            _ => None,
        }
    }
}

impl<E: Recovery> Recovery for PipelineError<E> {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::Open(error) => error.recovery(),
            Self::TimedOut(error) => error.recovery(),
            Self::Context(error) => error.recovery(),
            Self::Operation(error) => error.recovery(),
        }
    }
}

impl<E> From<RetryError<Self>> for PipelineError<E> {
    fn from(error: RetryError<Self>) -> Self {
        match error {
            RetryError::Operation { source, .. } => source,
            RetryError::Context { source, .. } => Self::Context(source),
        }
    }
}

/// Runs operations through a circuit breaker, a retryer and a timeout manager.
///
/// The breaker is shared, usually obtained from a
/// [`CircuitBreakerRegistry`][crate::breaker::CircuitBreakerRegistry], so several pipelines
/// calling the same dependency see the same circuit.
#[derive(Debug, Clone)]
pub struct Pipeline {
    breaker: Arc<CircuitBreaker>,
    retryer: Retryer,
    timeouts: TimeoutManager,
    attempt_timeout: Option<Duration>,
}

impl Pipeline {
    /// Creates a pipeline from its three mechanisms.
    #[must_use]
    pub fn new(breaker: Arc<CircuitBreaker>, retryer: Retryer, timeouts: TimeoutManager) -> Self {
        Self {
            breaker,
            retryer,
            timeouts,
            attempt_timeout: None,
        }
    }

    /// Sets the timeout of each attempt.
    ///
    /// **Default**: the default timeout of the [`TimeoutManager`].
    #[must_use]
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Returns the circuit breaker guarding this pipeline.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Runs `operation` with circuit breaking, retries and a timeout per attempt.
    ///
    /// `label` names the operation in timeout errors, logs and metrics. Must be called within
    /// a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the outcome of the last attempt, see [`PipelineError`]. A caller context that
    /// is done ends the call with [`PipelineError::Context`].
    pub async fn execute<T, E, F, Fut>(
        &self,
        ctx: &CallContext,
        label: impl Into<Cow<'static, str>>,
        operation: F,
    ) -> Result<T, PipelineError<E>>
    where
        F: Fn(CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Error + Send + 'static,
    {
        let label = label.into();

        self.retryer
            .execute(ctx, |attempt_ctx| self.attempt(attempt_ctx, label.clone(), &operation))
            .await
            .map_err(PipelineError::from)
    }

    async fn attempt<T, E, F, Fut>(
        &self,
        ctx: CallContext,
        label: Cow<'static, str>,
        operation: &F,
    ) -> Result<T, PipelineError<E>>
    where
        F: Fn(CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.breaker.allow().map_err(PipelineError::Open)?;

        match self.timeouts.execute(&ctx, self.attempt_timeout, label, operation).await {
            Ok(value) => {
                self.breaker.record_success();
                Ok(value)
            }
            Err(timeout::ExecuteError::TimedOut(error)) => {
                self.breaker.record_failure();
                Err(PipelineError::TimedOut(error))
            }
            Err(timeout::ExecuteError::Operation(error)) => {
                self.breaker.record_failure();
                Err(PipelineError::Operation(error))
            }
            Err(timeout::ExecuteError::Context(reason)) => Err(PipelineError::Context(reason)),
        }
    }
}
