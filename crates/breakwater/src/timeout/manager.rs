// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::time::Duration;

use super::{ExecuteError, OnTimeoutArgs, TimeoutConfig, TimeoutError};
use crate::telemetry::Telemetry;
use crate::{CallContext, ContextError, ResilienceContext, classify};

crate::define_fn_wrapper!(OnTimeout(Fn(args: OnTimeoutArgs<'_>)));

/// Bounds how long a single attempt may run.
///
/// Each call to [`execute`][Self::execute] derives an attempt context from the caller's
/// context. The derived deadline is `now + timeout` unless the caller's deadline is sooner, in
/// which case the caller's deadline is kept. A nested timeout therefore never extends the
/// budget of an outer caller.
///
/// # Abandoned operations
///
/// The operation runs on its own Tokio task. When the deadline elapses or the caller context
/// is cancelled, `execute` returns immediately and cancels the attempt context, but the task is
/// not aborted: it keeps running until it observes the cancellation and its result is
/// discarded. Operations should race their work against
/// [`CallContext::done`] or check [`CallContext::err`] regularly; an operation that ignores
/// its context outlives the call.
///
/// # Examples
///
/// ```rust
/// # use std::time::Duration;
/// # use tick::Clock;
/// use breakwater::ResilienceContext;
/// use breakwater::timeout::{TimeoutConfig, TimeoutManager};
///
/// # async fn example(clock: Clock) {
/// let timeouts = TimeoutManager::new(TimeoutConfig::default(), &ResilienceContext::new(&clock));
/// let ctx = breakwater::CallContext::new(&clock);
///
/// let result = timeouts
///     .execute(&ctx, Duration::from_millis(50), "get_user", |ctx| async move {
///         // pass `ctx` to the I/O so it stops when the attempt is over
///         Ok::<_, std::io::Error>("user")
///     })
///     .await;
/// # let _ = result;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TimeoutManager {
    config: TimeoutConfig,
    telemetry: Telemetry,
    on_timeout: Option<OnTimeout>,
}

impl TimeoutManager {
    /// Creates a manager. The configuration is [normalized][TimeoutConfig::normalized] first.
    #[must_use]
    pub fn new(config: TimeoutConfig, context: &ResilienceContext) -> Self {
        Self {
            config: config.normalized(),
            telemetry: context.telemetry(),
            on_timeout: None,
        }
    }

    /// Configures a callback invoked when the manager's own deadline elapses.
    ///
    /// **Default**: None
    #[must_use]
    pub fn on_timeout(mut self, callback: impl Fn(OnTimeoutArgs<'_>) + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(OnTimeout::new(callback));
        self
    }

    /// Returns the normalized configuration.
    #[must_use]
    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }

    /// Derives an attempt context bounded by `timeout`, never extending the deadline of `ctx`.
    ///
    /// Cancel the returned context to release it early.
    #[must_use]
    pub fn with_timeout(&self, ctx: &CallContext, timeout: Duration) -> CallContext {
        attempt_context(ctx, timeout).0
    }

    /// Runs `operation` under a deadline of `timeout`, or the configured default timeout when
    /// `None` is passed.
    ///
    /// `label` names the operation in errors, logs and metrics.
    ///
    /// Must be called within a Tokio runtime. A panic in the operation is resumed on the caller.
    ///
    /// # Errors
    ///
    /// - [`ExecuteError::TimedOut`] when the manager's own deadline elapses first.
    /// - [`ExecuteError::Context`] when the caller context is cancelled or reaches its own,
    ///   sooner deadline, including when it is already done before the call.
    /// - [`ExecuteError::Operation`] when the operation fails.
    pub async fn execute<T, E, F, Fut>(
        &self,
        ctx: &CallContext,
        timeout: impl Into<Option<Duration>>,
        label: impl Into<Cow<'static, str>>,
        operation: F,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let timeout = timeout.into().unwrap_or(self.config.default_timeout);

        if let Some(reason) = ctx.err() {
            return Err(ExecuteError::Context(reason));
        }

        let (attempt, imposed) = attempt_context(ctx, timeout);
        let mut task = tokio::spawn(operation(attempt.clone()));

        tokio::select! {
            biased;

            reason = attempt.done() => {
                attempt.cancel();

                match reason {
                    ContextError::DeadlineExceeded if imposed => Err(ExecuteError::TimedOut(self.timed_out(label.into(), timeout))),
                    reason => Err(ExecuteError::Context(reason)),
                }
            }
            joined = &mut task => match joined {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(ExecuteError::Operation(error)),
                Err(join_error) if join_error.is_panic() => std::panic::resume_unwind(join_error.into_panic()),
                Err(_) => Err(ExecuteError::Context(ContextError::Canceled)),
            },
        }
    }

    fn timed_out(&self, label: Cow<'static, str>, timeout: Duration) -> TimeoutError {
        if let Some(callback) = &self.on_timeout {
            callback.call(OnTimeoutArgs { label: &label, timeout });
        }

        self.telemetry
            .record_error(&self.telemetry.pipeline_name, &label, classify::TIMEOUT);

        #[cfg(any(feature = "logs", test))]
        if self.telemetry.logs_enabled {
            tracing::event!(
                name: "breakwater.timeout",
                tracing::Level::WARN,
                pipeline.name = %self.telemetry.pipeline_name,
                timeout.label = %label,
                timeout.ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            );
        }

        TimeoutError::new(label, timeout)
    }
}

/// Returns the attempt context and whether its deadline was imposed by the manager.
fn attempt_context(ctx: &CallContext, timeout: Duration) -> (CallContext, bool) {
    let Some(requested) = ctx.clock().instant().checked_add(timeout) else {
        return (ctx.child(), false);
    };

    match ctx.deadline() {
        Some(deadline) if deadline <= requested => (ctx.child(), false),
        _ => (ctx.with_deadline(requested), true),
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use tick::{Clock, ClockControl};

    use super::*;
    use crate::testing::{LogCapture, MetricEvent, RecordingMetrics};

    fn manager(clock: &Clock) -> TimeoutManager {
        TimeoutManager::new(TimeoutConfig::default(), &ResilienceContext::new(clock))
    }

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(TimeoutManager: Send, Sync, Clone, std::fmt::Debug);
    }

    #[test]
    fn with_timeout_imposes_deadline_without_outer_deadline() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let ctx = CallContext::new(&clock);

        let attempt = manager(&clock).with_timeout(&ctx, Duration::from_millis(50));

        assert_eq!(attempt.remaining(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn with_timeout_keeps_sooner_outer_deadline() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let ctx = CallContext::new(&clock).with_timeout(Duration::from_millis(20));

        let attempt = manager(&clock).with_timeout(&ctx, Duration::from_millis(500));

        assert_eq!(attempt.deadline(), ctx.deadline());

        // cancelling the attempt leaves the caller untouched
        attempt.cancel();
        assert_eq!(ctx.err(), None);
    }

    #[test]
    fn with_timeout_shortens_later_outer_deadline() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let ctx = CallContext::new(&clock).with_timeout(Duration::from_secs(10));

        let attempt = manager(&clock).with_timeout(&ctx, Duration::from_secs(1));

        assert_eq!(attempt.remaining(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn attempt_context_reports_imposed_deadline() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let root = CallContext::new(&clock);

        assert!(attempt_context(&root, Duration::from_secs(1)).1);
        assert!(!attempt_context(&root.with_timeout(Duration::from_millis(10)), Duration::from_secs(1)).1);
        assert!(attempt_context(&root.with_timeout(Duration::from_secs(10)), Duration::from_secs(1)).1);
        assert!(!attempt_context(&root, Duration::MAX).1);
    }

    #[tokio::test]
    async fn returns_value() {
        let clock = Clock::new_tokio();
        let ctx = CallContext::new(&clock);

        let value = manager(&clock)
            .execute(&ctx, Duration::from_secs(5), "fast", |_| async { Ok::<_, std::io::Error>(7) })
            .await
            .unwrap();

        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn operation_error_passes_through() {
        let clock = Clock::new_tokio();
        let ctx = CallContext::new(&clock);

        let error = manager(&clock)
            .execute(&ctx, Duration::from_secs(5), "failing", |_| async {
                Err::<(), _>(std::io::Error::other("boom"))
            })
            .await
            .unwrap_err();

        assert_eq!(error.into_operation().unwrap().to_string(), "boom");
    }

    #[tokio::test]
    async fn times_out_slow_operation() {
        let clock = Clock::new_tokio();
        let ctx = CallContext::new(&clock);
        let sink = RecordingMetrics::new();
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = Arc::clone(&seen);

        let manager = TimeoutManager::new(
            TimeoutConfig::default(),
            &ResilienceContext::new(&clock).name("orders").metrics(sink.clone().into_sink()),
        )
        .on_timeout(move |args| {
            assert_eq!(args.label(), "slow");
            assert_eq!(args.timeout(), Duration::from_millis(50));
            seen_clone.fetch_add(1, Ordering::Relaxed);
        });

        let stopwatch = clock.stopwatch();
        let op_clock = clock.clone();
        let error = manager
            .execute(&ctx, Duration::from_millis(50), "slow", move |_| async move {
                op_clock.delay(Duration::from_millis(200)).await;
                Ok::<_, std::io::Error>(())
            })
            .await
            .unwrap_err();

        assert!(stopwatch.elapsed() < Duration::from_millis(200));
        assert!(error.is_timeout());
        assert!(matches!(&error, ExecuteError::TimedOut(e) if e.label() == "slow"));
        assert_eq!(seen.load(Ordering::Relaxed), 1);
        assert_eq!(
            sink.events(),
            vec![MetricEvent::Error {
                service: "orders".into(),
                endpoint: "slow".into(),
                error_type: "timeout".into()
            }]
        );
    }

    #[tokio::test]
    async fn outer_deadline_wins_over_longer_timeout() {
        let clock = Clock::new_tokio();
        let ctx = CallContext::new(&clock).with_timeout(Duration::from_millis(20));
        let timed_out = Arc::new(AtomicBool::new(false));
        let timed_out_clone = Arc::clone(&timed_out);
        let manager = manager(&clock).on_timeout(move |_| timed_out_clone.store(true, Ordering::Relaxed));

        let stopwatch = clock.stopwatch();
        let error = manager
            .execute(&ctx, Duration::from_millis(500), "nested", |attempt| async move {
                attempt.done().await;
                Ok::<_, std::io::Error>(())
            })
            .await
            .unwrap_err();

        assert!(stopwatch.elapsed() < Duration::from_millis(500));
        assert!(matches!(error, ExecuteError::Context(ContextError::DeadlineExceeded)));
        assert!(!timed_out.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn outer_cancellation_is_reported_as_context_error() {
        let clock = Clock::new_tokio();
        let ctx = CallContext::new(&clock);
        let canceller = ctx.clone();
        let op_clock = clock.clone();

        let error = manager(&clock)
            .execute(&ctx, Duration::from_secs(5), "cancelled", move |_| async move {
                op_clock.delay(Duration::from_millis(20)).await;
                canceller.cancel();
                op_clock.delay(Duration::from_secs(5)).await;
                Ok::<_, std::io::Error>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(error, ExecuteError::Context(ContextError::Canceled)));
    }

    #[tokio::test]
    async fn done_context_short_circuits() {
        let clock = Clock::new_tokio();
        let ctx = CallContext::new(&clock);
        ctx.cancel();
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = Arc::clone(&called);

        let error = manager(&clock)
            .execute(&ctx, None, "never", move |_| async move {
                called_clone.store(true, Ordering::Relaxed);
                Ok::<_, std::io::Error>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(error, ExecuteError::Context(ContextError::Canceled)));
        assert!(!called.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn attempt_context_is_cancelled_after_timeout() {
        let clock = Clock::new_tokio();
        let ctx = CallContext::new(&clock);
        let (sender, receiver) = tokio::sync::oneshot::channel();
        let op_clock = clock.clone();

        let error = manager(&clock)
            .execute(&ctx, Duration::from_millis(20), "cooperative", move |attempt| async move {
                while !attempt.is_cancelled() {
                    op_clock.delay(Duration::from_millis(5)).await;
                }
                _ = sender.send(attempt.err());
                Ok::<_, std::io::Error>(())
            })
            .await
            .unwrap_err();

        assert!(error.is_timeout());
        assert_eq!(receiver.await.unwrap(), Some(ContextError::Canceled));
        assert_eq!(ctx.err(), None);
    }

    #[tokio::test]
    async fn none_uses_default_timeout() {
        let clock = Clock::new_tokio();
        let ctx = CallContext::new(&clock);
        let manager = TimeoutManager::new(
            TimeoutConfig::default().default_timeout(Duration::from_millis(20)),
            &ResilienceContext::new(&clock),
        );

        let error = manager
            .execute(&ctx, None, "default", |attempt| async move {
                attempt.done().await;
                Ok::<_, std::io::Error>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(&error, ExecuteError::TimedOut(e) if e.timeout() == Duration::from_millis(20)));
    }

    #[tokio::test]
    #[should_panic(expected = "operation exploded")]
    async fn panic_is_resumed() {
        let clock = Clock::new_tokio();
        let ctx = CallContext::new(&clock);

        fn explode() -> Result<(), std::io::Error> {
            std::panic::panic_any("operation exploded")
        }

        let _ = manager(&clock)
            .execute(&ctx, Duration::from_secs(5), "panicking", |_| async { explode() })
            .await;
    }

    #[tokio::test]
    async fn logs_timeouts() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let clock = Clock::new_tokio();
        let ctx = CallContext::new(&clock);
        let manager = TimeoutManager::new(
            TimeoutConfig::default(),
            &ResilienceContext::new(&clock).name("orders").enable_logs(),
        );

        let _ = manager
            .execute(&ctx, Duration::from_millis(10), "get_order", |attempt| async move {
                attempt.done().await;
                Ok::<_, std::io::Error>(())
            })
            .await;

        capture.assert_contains("breakwater::timeout");
        capture.assert_contains("pipeline.name=orders");
        capture.assert_contains("timeout.label=get_order");
        capture.assert_contains("timeout.ms=10");
    }
}
