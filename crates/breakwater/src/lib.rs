// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Resilience primitives for outbound clients.
//!
//! Clients that talk to an external dependency (a REST or GraphQL endpoint, a database, a cache)
//! use this crate to protect their callers from a failing or slow dependency. Three cooperating
//! mechanisms are provided:
//!
//! - [`breaker`]: a per-dependency circuit breaker that stops calling a dependency once it is
//!   judged unhealthy, plus a [`CircuitBreakerRegistry`][breaker::CircuitBreakerRegistry] that
//!   lazily creates one breaker per dependency name.
//! - [`retry`]: a retrying executor that re-attempts transient failures with exponential backoff
//!   and jitter.
//! - [`timeout`]: a timeout manager that bounds a single attempt while respecting a shorter
//!   deadline already carried by the caller.
//!
//! The [`classify`] module decides which failures are transient, and [`backoff`] computes the
//! delays between attempts. [`pipeline`] wires all of the above together.
//!
//! # Composition
//!
//! A typical call flows through the mechanisms in this order:
//!
//! ```text
//! caller → CircuitBreaker::allow
//!        → Retryer::execute
//!            → for each attempt: TimeoutManager::execute → operation (network call)
//!        → CircuitBreaker::record_success / record_failure
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! # use std::time::Duration;
//! # use tick::Clock;
//! use breakwater::breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use breakwater::retry::{RetryPolicy, Retryer};
//! use breakwater::timeout::{TimeoutConfig, TimeoutManager};
//! use breakwater::{CallContext, ResilienceContext};
//!
//! # async fn example(clock: Clock) {
//! let context = ResilienceContext::new(&clock).name("billing_client");
//!
//! let breaker = CircuitBreaker::new("billing", CircuitBreakerConfig::default(), &context);
//! let retryer = Retryer::new(RetryPolicy::default(), &context).with_service("billing", "/invoices");
//! let timeouts = TimeoutManager::new(TimeoutConfig::default(), &context);
//!
//! let ctx = CallContext::new(&clock);
//! let timeouts = &timeouts;
//!
//! if breaker.allow().is_ok() {
//!     let result = retryer
//!         .execute(&ctx, |ctx| async move {
//!             timeouts
//!                 .execute(&ctx, Duration::from_secs(2), "get_invoice", |_attempt_ctx| async {
//!                     Ok::<_, std::io::Error>("invoice".to_string())
//!                 })
//!                 .await
//!         })
//!         .await;
//!
//!     match result {
//!         Ok(_) => breaker.record_success(),
//!         Err(_) => breaker.record_failure(),
//!     }
//! }
//! # }
//! ```
//!
//! The [`pipeline::Pipeline`] type performs exactly these steps in one call.
//!
//! # Time
//!
//! All time reads and delays go through the [`Clock`][tick::Clock] from the [`tick`] crate,
//! passed in through [`ResilienceContext`]. Tests drive the clock with `tick::ClockControl`
//! instead of waiting for real time to pass.
//!
//! # Features
//!
//! - `logs`: emits structured [`tracing`](https://docs.rs/tracing) events for state changes,
//!   retries and timeouts when enabled through [`ResilienceContext::enable_logs`].
//! - `metrics`: provides [`OpenTelemetryMetrics`][telemetry::OpenTelemetryMetrics], a
//!   [`MetricsSink`][telemetry::MetricsSink] backed by OpenTelemetry instruments.
//! - `serde`: implements `Serialize` and `Deserialize` for the configuration types.

#[doc(inline)]
pub use recoverable::{Recovery, RecoveryInfo, RecoveryKind};

mod fn_wrapper;
pub(crate) use fn_wrapper::define_fn_wrapper;

mod call;
pub use call::{CallContext, ContextError};

mod context;
pub use context::ResilienceContext;

pub mod backoff;
pub mod breaker;
pub mod classify;
pub mod pipeline;
pub mod retry;
pub mod telemetry;
pub mod timeout;

mod rnd;

pub(crate) const ERR_POISONED_LOCK: &str = "poisoned lock - cannot continue execution because the state might be corrupted";

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
pub(crate) mod testing;
