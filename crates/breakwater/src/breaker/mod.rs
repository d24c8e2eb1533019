// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Circuit breaking for a single external dependency.
//!
//! A [`CircuitBreaker`] gates calls to one dependency and moves between three states:
//!
//! - **Closed** (initial): calls are allowed and consecutive failures are counted. Reaching
//!   [`failure_threshold`][CircuitBreakerConfig::failure_threshold] failures opens the circuit.
//!   A success clears the count.
//! - **Open**: calls are rejected with [`CircuitOpenError`] until
//!   [`open_timeout`][CircuitBreakerConfig::open_timeout] has elapsed since the last failure.
//!   The first [`allow`][CircuitBreaker::allow] after that moves the breaker to half-open.
//! - **Half-open**: calls are allowed as probes. A single failure reopens the circuit, and
//!   [`half_open_required_successes`][CircuitBreakerConfig::half_open_required_successes]
//!   successes close it.
//!
//! The number of concurrent probes in the half-open state is not limited.
//!
//! Callers either drive the breaker by hand (`allow`, then `record_success` or
//! `record_failure` once their own I/O completes) or use [`CircuitBreaker::execute`].
//!
//! A [`CircuitBreakerRegistry`] creates one breaker per dependency name on first use.
//!
//! # Telemetry
//!
//! Every transition invokes the optional [`on_state_change`][CircuitBreaker::on_state_change]
//! callback and updates the state gauge of the configured
//! [`MetricsSink`][crate::telemetry::MetricsSink]. With the `logs` feature, transitions emit a
//! `breakwater.circuit_breaker.state_changed` event and rejections emit
//! `breakwater.circuit_breaker.rejected`.

mod args;
mod circuit_breaker;
mod config;
mod error;
mod registry;
mod state;
mod stats;

pub use args::OnStateChangeArgs;
pub use circuit_breaker::CircuitBreaker;
pub use config::CircuitBreakerConfig;
pub use error::{CircuitOpenError, ExecuteError};
pub use registry::CircuitBreakerRegistry;
pub use state::CircuitState;
pub use stats::CircuitBreakerStats;
