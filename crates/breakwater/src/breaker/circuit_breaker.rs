// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tick::Clock;

use super::{CircuitBreakerConfig, CircuitBreakerStats, CircuitOpenError, CircuitState, ExecuteError, OnStateChangeArgs};
use crate::telemetry::Telemetry;
use crate::{CallContext, ERR_POISONED_LOCK, ResilienceContext};

crate::define_fn_wrapper!(OnStateChange(Fn(args: OnStateChangeArgs<'_>)));

/// Marks `last_failure` as never having been set.
const NEVER: u64 = u64::MAX;

/// A per-dependency circuit breaker.
///
/// The breaker is safe to share between any number of concurrent callers, usually behind an
/// [`Arc`][std::sync::Arc]. Reads of the state are lock-free; only state transitions take a
/// short internal lock, which is never held while the caller performs I/O.
///
/// # Examples
///
/// ```rust
/// # use tick::Clock;
/// use breakwater::ResilienceContext;
/// use breakwater::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
///
/// # fn example(clock: Clock) {
/// let context = ResilienceContext::new(&clock);
/// let breaker = CircuitBreaker::new("billing", CircuitBreakerConfig::default().failure_threshold(2), &context);
///
/// breaker.record_failure();
/// breaker.record_failure();
///
/// assert_eq!(breaker.state(), CircuitState::Open);
/// assert!(breaker.allow().is_err());
/// # }
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    name: Cow<'static, str>,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    failures: AtomicU32,
    half_open_successes: AtomicU32,
    // both timestamps are nanoseconds since `origin`
    last_failure: AtomicU64,
    last_state_change: AtomicU64,
    origin: Instant,
    transition: Mutex<()>,
    clock: Clock,
    telemetry: Telemetry,
    on_state_change: Option<OnStateChange>,
}

impl CircuitBreaker {
    /// Creates a closed circuit breaker for the dependency called `name`.
    ///
    /// The configuration is [normalized][CircuitBreakerConfig::normalized] first.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, config: CircuitBreakerConfig, context: &ResilienceContext) -> Self {
        let clock = context.clock().clone();
        let breaker = Self {
            name: name.into(),
            config: config.normalized(),
            state: AtomicU8::new(CircuitState::Closed as u8),
            failures: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
            last_failure: AtomicU64::new(NEVER),
            last_state_change: AtomicU64::new(0),
            origin: clock.instant(),
            transition: Mutex::new(()),
            clock,
            telemetry: context.telemetry(),
            on_state_change: None,
        };

        breaker.telemetry.set_circuit_breaker_state(&breaker.name, CircuitState::Closed);
        breaker
    }

    /// Configures a callback invoked on every state transition.
    ///
    /// The callback runs synchronously while the breaker holds its transition lock, so
    /// notifications are never observed out of order. It must be quick and must not call back
    /// into the same breaker.
    ///
    /// **Default**: None
    #[must_use]
    pub fn on_state_change(mut self, callback: impl Fn(OnStateChangeArgs<'_>) + Send + Sync + 'static) -> Self {
        self.on_state_change = Some(OnStateChange::new(callback));
        self
    }

    pub(super) fn with_on_state_change(mut self, callback: Option<OnStateChange>) -> Self {
        self.on_state_change = callback;
        self
    }

    /// Returns the name of the dependency this breaker guards.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the normalized configuration.
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Checks whether a call may proceed.
    ///
    /// Closed and half-open breakers always allow the call. An open breaker rejects it until
    /// the open timeout has elapsed since the last failure; the first call after that moves the
    /// breaker to half-open and is allowed through as a probe.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitOpenError`] while the breaker is open.
    pub fn allow(&self) -> Result<(), CircuitOpenError> {
        if self.state() != CircuitState::Open {
            return Ok(());
        }

        let remaining = self.remaining_open();
        if !remaining.is_zero() {
            return Err(self.rejected(remaining));
        }

        let guard = self.lock();

        // another caller may have moved the breaker while we were waiting for the lock
        if self.state() != CircuitState::Open {
            return Ok(());
        }

        let remaining = self.remaining_open();
        if !remaining.is_zero() {
            return Err(self.rejected(remaining));
        }

        self.transition(&guard, CircuitState::Open, CircuitState::HalfOpen);
        Ok(())
    }

    /// Records a successful call.
    ///
    /// In the closed state this clears the failure count. In the half-open state it counts a
    /// successful probe and closes the breaker once enough probes succeeded.
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => self.failures.store(0, Ordering::Release),
            CircuitState::HalfOpen => {
                let guard = self.lock();

                // the probe round this success belonged to may have ended while we waited
                if self.state() != CircuitState::HalfOpen {
                    return;
                }

                let successes = self.half_open_successes.fetch_add(1, Ordering::AcqRel).saturating_add(1);
                if successes >= self.config.half_open_required_successes {
                    self.transition(&guard, CircuitState::HalfOpen, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed call.
    ///
    /// The failure time is always updated. In the closed state the failure is counted and the
    /// breaker opens once the threshold is reached. In the half-open state the breaker reopens
    /// immediately.
    pub fn record_failure(&self) {
        self.last_failure.store(self.now(), Ordering::Release);

        match self.state() {
            CircuitState::Closed => {
                let failures = self.failures.fetch_add(1, Ordering::AcqRel).saturating_add(1);
                if failures < self.config.failure_threshold {
                    return;
                }

                let guard = self.lock();
                if self.state() == CircuitState::Closed
                    && self.failures.load(Ordering::Acquire) >= self.config.failure_threshold
                {
                    self.transition(&guard, CircuitState::Closed, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                let guard = self.lock();
                if self.state() == CircuitState::HalfOpen {
                    self.transition(&guard, CircuitState::HalfOpen, CircuitState::Open);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Runs `operation` if the breaker allows it and records the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ExecuteError::Open`] without running the operation when the breaker is open,
    /// or [`ExecuteError::Operation`] with the error returned by the operation.
    pub async fn execute<T, E, F, Fut>(&self, ctx: &CallContext, operation: F) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.allow().map_err(ExecuteError::Open)?;

        match operation(ctx.clone()).await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(ExecuteError::Operation(error))
            }
        }
    }

    /// Returns a snapshot of the breaker.
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let now = self.now();
        let last_failure = self.last_failure.load(Ordering::Acquire);

        CircuitBreakerStats {
            name: self.name.to_string(),
            state: self.state(),
            failures: self.failures.load(Ordering::Acquire),
            half_open_successes: self.half_open_successes.load(Ordering::Acquire),
            since_last_failure: (last_failure != NEVER).then(|| nanos_to_duration(now.saturating_sub(last_failure))),
            since_state_change: nanos_to_duration(now.saturating_sub(self.last_state_change.load(Ordering::Acquire))),
        }
    }

    /// Returns the breaker to the closed state with zeroed counters.
    ///
    /// Resetting an already reset breaker has no further effect.
    pub fn reset(&self) {
        let guard = self.lock();

        self.last_failure.store(NEVER, Ordering::Release);

        match self.state() {
            CircuitState::Closed => {
                self.failures.store(0, Ordering::Release);
                self.half_open_successes.store(0, Ordering::Release);
            }
            from => self.transition(&guard, from, CircuitState::Closed),
        }
    }

    /// Moves the breaker to `to`. The guard proves the caller holds the transition lock.
    fn transition(&self, _guard: &MutexGuard<'_, ()>, from: CircuitState, to: CircuitState) {
        #[cfg(any(feature = "logs", test))]
        let failures = self.failures.load(Ordering::Acquire);

        match to {
            CircuitState::Closed => {
                self.failures.store(0, Ordering::Release);
                self.half_open_successes.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen | CircuitState::Open => self.half_open_successes.store(0, Ordering::Release),
        }

        self.state.store(to as u8, Ordering::Release);
        self.last_state_change.store(self.now(), Ordering::Release);

        if let Some(callback) = &self.on_state_change {
            callback.call(OnStateChangeArgs {
                name: &self.name,
                from,
                to,
            });
        }

        self.telemetry.set_circuit_breaker_state(&self.name, to);

        #[cfg(any(feature = "logs", test))]
        if self.telemetry.logs_enabled {
            if to == CircuitState::Open {
                tracing::event!(
                    name: "breakwater.circuit_breaker.state_changed",
                    tracing::Level::WARN,
                    pipeline.name = %self.telemetry.pipeline_name,
                    circuit_breaker.name = %self.name,
                    circuit_breaker.from = %from,
                    circuit_breaker.to = %to,
                    circuit_breaker.failures = failures,
                );
            } else {
                tracing::event!(
                    name: "breakwater.circuit_breaker.state_changed",
                    tracing::Level::INFO,
                    pipeline.name = %self.telemetry.pipeline_name,
                    circuit_breaker.name = %self.name,
                    circuit_breaker.from = %from,
                    circuit_breaker.to = %to,
                    circuit_breaker.failures = failures,
                );
            }
        }
    }

    fn rejected(&self, retry_after: Duration) -> CircuitOpenError {
        #[cfg(any(feature = "logs", test))]
        if self.telemetry.logs_enabled {
            tracing::event!(
                name: "breakwater.circuit_breaker.rejected",
                tracing::Level::WARN,
                pipeline.name = %self.telemetry.pipeline_name,
                circuit_breaker.name = %self.name,
                circuit_breaker.state = %CircuitState::Open,
                circuit_breaker.retry_after.ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
            );
        }

        CircuitOpenError::new(self.name.clone(), retry_after)
    }

    /// Time left until an open breaker allows a probe.
    fn remaining_open(&self) -> Duration {
        let last_failure = self.last_failure.load(Ordering::Acquire);
        if last_failure == NEVER {
            return Duration::ZERO;
        }

        let elapsed = nanos_to_duration(self.now().saturating_sub(last_failure));
        self.config.open_timeout.saturating_sub(elapsed)
    }

    fn now(&self) -> u64 {
        let elapsed = self.clock.instant().saturating_duration_since(self.origin);
        u64::try_from(elapsed.as_nanos()).unwrap_or(NEVER - 1)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().expect(ERR_POISONED_LOCK)
    }
}

fn nanos_to_duration(nanos: u64) -> Duration {
    Duration::from_nanos(nanos)
}
