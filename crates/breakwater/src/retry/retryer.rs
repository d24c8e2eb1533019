// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::error::Error;
use std::time::Duration;

use tick::Clock;

use super::{OnRetryArgs, RetryError, RetryPolicy};
use crate::backoff::Backoff;
use crate::classify::{self, Classification};
use crate::telemetry::{STATUS_SUCCESS, Telemetry};
use crate::{CallContext, ResilienceContext};

crate::define_fn_wrapper!(RetryIf(Fn(error: &(dyn Error + 'static)) -> bool));
crate::define_fn_wrapper!(StatusOf(Fn(error: &(dyn Error + 'static)) -> Option<u16>));
crate::define_fn_wrapper!(OnRetry(Fn(args: OnRetryArgs<'_>)));

/// Re-attempts failed operations according to a [`RetryPolicy`].
///
/// A `Retryer` is cheap to clone; clones share the policy and callbacks. Use
/// [`with_service`][Self::with_service] to derive a retryer that reports telemetry for a
/// specific dependency endpoint.
///
/// # Examples
///
/// ```rust
/// # use std::time::Duration;
/// # use tick::Clock;
/// use breakwater::retry::{RetryPolicy, Retryer};
/// use breakwater::{CallContext, ResilienceContext};
///
/// # async fn example(clock: Clock) {
/// let context = ResilienceContext::new(&clock);
/// let retryer = Retryer::new(RetryPolicy::default().max_attempts(4), &context)
///     .with_service("users", "/users/{id}")
///     .on_retry(|args| println!("attempt {} failed, retrying in {:?}", args.attempt(), args.delay()));
///
/// let ctx = CallContext::new(&clock);
/// let user = retryer
///     .execute(&ctx, |_ctx| async { Ok::<_, std::io::Error>("jane") })
///     .await;
/// # let _ = user;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Retryer {
    policy: RetryPolicy,
    backoff: Backoff,
    service: Cow<'static, str>,
    endpoint: Cow<'static, str>,
    clock: Clock,
    telemetry: Telemetry,
    retry_if: Option<RetryIf>,
    status_of: Option<StatusOf>,
    on_retry: Option<OnRetry>,
}

impl Retryer {
    /// Creates a retryer. The policy is [normalized][RetryPolicy::normalized] first.
    ///
    /// Telemetry is reported against the context name as the service and an empty endpoint
    /// until [`with_service`][Self::with_service] is used.
    #[must_use]
    pub fn new(policy: RetryPolicy, context: &ResilienceContext) -> Self {
        let policy = policy.normalized();
        let telemetry = context.telemetry();

        Self {
            backoff: policy.backoff(),
            policy,
            service: telemetry.pipeline_name.clone(),
            endpoint: Cow::Borrowed(""),
            clock: context.clock().clone(),
            telemetry,
            retry_if: None,
            status_of: None,
            on_retry: None,
        }
    }

    /// Returns a retryer that reports telemetry against `service` and `endpoint`.
    ///
    /// The returned retryer shares the policy and callbacks of this one.
    #[must_use]
    pub fn with_service(&self, service: impl Into<Cow<'static, str>>, endpoint: impl Into<Cow<'static, str>>) -> Self {
        Self {
            service: service.into(),
            endpoint: endpoint.into(),
            ..self.clone()
        }
    }

    /// Returns a retryer that uses `policy` instead of the current one.
    ///
    /// The policy is [normalized][RetryPolicy::normalized] first.
    #[must_use]
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        let policy = policy.normalized();

        Self {
            backoff: policy.backoff(),
            policy,
            ..self.clone()
        }
    }

    /// Replaces the built-in [classification][crate::classify] with a custom predicate that
    /// decides which errors are retried.
    ///
    /// The predicate receives the error of the failed attempt. Its decision is final: an error
    /// the classifier considers permanent is still retried when the predicate returns `true`.
    ///
    /// **Default**: None, errors are retried when [`classify::is_retryable`] returns `true`.
    #[must_use]
    pub fn retry_if(mut self, predicate: impl Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static) -> Self {
        self.retry_if = Some(RetryIf::new(predicate));
        self
    }

    /// Teaches the classifier to read status codes from error types it does not know.
    ///
    /// The extractor is applied to every error in the [`source`][Error::source] chain of a
    /// failed attempt and the first status it returns is classified like an
    /// [`HttpError`][crate::classify::HttpError]. Usually it downcasts to a transport error that
    /// implements [`StatusCode`][crate::classify::StatusCode].
    ///
    /// **Default**: None, only the errors listed in [`classify`][crate::classify] are recognized.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use tick::Clock;
    /// # #[derive(Debug, thiserror::Error)]
    /// # #[error("upstream returned status {0}")]
    /// # struct TransportError(u16);
    /// # impl StatusCode for TransportError {
    /// #     fn status_code(&self) -> u16 {
    /// #         self.0
    /// #     }
    /// # }
    /// use breakwater::ResilienceContext;
    /// use breakwater::classify::StatusCode;
    /// use breakwater::retry::{RetryPolicy, Retryer};
    ///
    /// # fn example(clock: Clock) {
    /// let retryer = Retryer::new(RetryPolicy::default(), &ResilienceContext::new(&clock))
    ///     .status_code(|error| error.downcast_ref::<TransportError>().map(StatusCode::status_code));
    /// # let _ = retryer;
    /// # }
    /// ```
    #[must_use]
    pub fn status_code(
        mut self,
        extractor: impl Fn(&(dyn Error + 'static)) -> Option<u16> + Send + Sync + 'static,
    ) -> Self {
        self.status_of = Some(StatusOf::new(extractor));
        self
    }

    /// Configures a callback invoked before each retry, once the delay is known.
    ///
    /// **Default**: None
    #[must_use]
    pub fn on_retry(mut self, callback: impl Fn(OnRetryArgs<'_>) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(OnRetry::new(callback));
        self
    }

    /// Returns the normalized policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails permanently or runs out of attempts.
    ///
    /// Each attempt receives a clone of `ctx`. Combine with
    /// [`TimeoutManager::execute`][crate::timeout::TimeoutManager::execute] inside the operation
    /// to bound individual attempts.
    ///
    /// # Errors
    ///
    /// - [`RetryError::Context`] when `ctx` is done after a failed attempt or becomes done
    ///   while waiting for the next one.
    /// - [`RetryError::Operation`] with the error of the last attempt otherwise.
    pub async fn execute<T, E, F, Fut>(&self, ctx: &CallContext, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        let mut attempt = 1;

        loop {
            let stopwatch = self.clock.stopwatch();
            let result = operation(ctx.clone()).await;
            let duration = stopwatch.elapsed();

            let error = match result {
                Ok(value) => {
                    self.telemetry
                        .record_call(&self.service, &self.endpoint, STATUS_SUCCESS, duration);
                    return Ok(value);
                }
                Err(error) => error,
            };

            let classification = self.classify(&error);
            self.telemetry
                .record_call(&self.service, &self.endpoint, classification.label(), duration);

            if let Some(reason) = ctx.err() {
                return Err(RetryError::Context {
                    attempts: attempt,
                    source: reason,
                });
            }

            if attempt >= self.policy.max_attempts {
                self.exhausted(attempt, &error, &classification);
                return Err(RetryError::Operation {
                    attempts: attempt,
                    source: error,
                });
            }

            if !self.should_retry(&error, &classification) {
                self.telemetry
                    .record_error(&self.service, &self.endpoint, classification.label());
                return Err(RetryError::Operation {
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = self.backoff.jittered(attempt);
            self.retrying(attempt, delay, &error, &classification);

            tokio::select! {
                biased;

                reason = ctx.done() => {
                    return Err(RetryError::Context {
                        attempts: attempt,
                        source: reason,
                    });
                }
                () = self.clock.delay(delay) => {}
            }

            attempt += 1;
        }
    }

    fn classify(&self, error: &(dyn Error + 'static)) -> Classification {
        let status = self
            .status_of
            .as_ref()
            .and_then(|extract| classify::chain(error).find_map(|current| extract.call(current)));

        classify::classify_with_status(error, status)
    }

    fn should_retry(&self, error: &(dyn Error + 'static), classification: &Classification) -> bool {
        match &self.retry_if {
            Some(predicate) => predicate.call(error),
            None => classification.is_retryable(),
        }
    }

    #[cfg_attr(
        not(any(feature = "logs", test)),
        expect(unused_variables, reason = "classification is only logged")
    )]
    fn retrying(&self, attempt: u32, delay: Duration, error: &(dyn Error + 'static), classification: &Classification) {
        if let Some(callback) = &self.on_retry {
            callback.call(OnRetryArgs { attempt, delay, error });
        }

        self.telemetry.record_retry(&self.service, &self.endpoint);

        #[cfg(any(feature = "logs", test))]
        if self.telemetry.logs_enabled {
            tracing::event!(
                name: "breakwater.retry",
                tracing::Level::WARN,
                pipeline.name = %self.telemetry.pipeline_name,
                retry.service = %self.service,
                retry.endpoint = %self.endpoint,
                retry.attempt = attempt,
                retry.delay.ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error.kind = %classification.label(),
                error.message = %error,
            );
        }
    }

    #[cfg_attr(
        not(any(feature = "logs", test)),
        expect(unused_variables, reason = "attempt and error are only logged")
    )]
    fn exhausted(&self, attempt: u32, error: &(dyn Error + 'static), classification: &Classification) {
        self.telemetry
            .record_error(&self.service, &self.endpoint, classification.label());

        #[cfg(any(feature = "logs", test))]
        if self.telemetry.logs_enabled {
            tracing::event!(
                name: "breakwater.retry.exhausted",
                tracing::Level::ERROR,
                pipeline.name = %self.telemetry.pipeline_name,
                retry.service = %self.service,
                retry.endpoint = %self.endpoint,
                retry.attempts = attempt,
                error.kind = %classification.label(),
                error.message = %error,
            );
        }
    }
}
