// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Metrics reporting for resilience events.
//!
//! Components never talk to a metrics backend directly. They report through the narrow
//! [`MetricsSink`] interface configured on the [`ResilienceContext`][crate::ResilienceContext].
//! Reporting is best-effort: sink methods return nothing and a context without a sink
//! reports nothing.
//!
//! With the `metrics` feature, [`OpenTelemetryMetrics`] implements the sink on top of
//! OpenTelemetry instruments:
//!
//! | Instrument | Kind | Attributes |
//! |------------|------|------------|
//! | `breakwater.client.calls` | counter | `service`, `endpoint`, `status` |
//! | `breakwater.client.call.duration` | histogram (s) | `service`, `endpoint`, `status` |
//! | `breakwater.client.retries` | counter | `service`, `endpoint` |
//! | `breakwater.client.errors` | counter | `service`, `endpoint`, `error.type` |
//! | `breakwater.circuit_breaker.state` | gauge | `service` |

use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::CircuitState;

#[cfg(any(feature = "metrics", test))]
mod otel;
#[cfg(any(feature = "metrics", test))]
pub use otel::OpenTelemetryMetrics;

/// The `status` reported for attempts that succeeded.
pub(crate) const STATUS_SUCCESS: &str = "success";

/// Receives metrics reported by the resilience components.
///
/// All methods default to doing nothing, so implementations only override what they collect.
/// Implementations must be cheap and must not block: they are called on the hot path, and
/// [`set_circuit_breaker_state`][Self::set_circuit_breaker_state] is called while a circuit
/// breaker holds its transition lock.
pub trait MetricsSink: Send + Sync {
    /// Records a completed attempt against `service`/`endpoint`.
    ///
    /// `status` is `success` for successful attempts, otherwise the failure classification
    /// label (for example `timeout` or `server_error`).
    fn record_call(&self, service: &str, endpoint: &str, status: &str, duration: Duration) {
        _ = (service, endpoint, status, duration);
    }

    /// Records that an attempt is about to be retried.
    fn record_retry(&self, service: &str, endpoint: &str) {
        _ = (service, endpoint);
    }

    /// Records a failure surfaced to the caller, labeled with its classification.
    fn record_error(&self, service: &str, endpoint: &str, error_type: &str) {
        _ = (service, endpoint, error_type);
    }

    /// Records the current state of the circuit breaker guarding `service`.
    fn set_circuit_breaker_state(&self, service: &str, state: CircuitState) {
        _ = (service, state);
    }
}

/// A [`MetricsSink`] that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// Telemetry handles shared by a single resilience component.
#[derive(Clone)]
pub(crate) struct Telemetry {
    pub(crate) pipeline_name: Cow<'static, str>,
    pub(crate) metrics: Option<Arc<dyn MetricsSink>>,
    pub(crate) logs_enabled: bool,
}

impl Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("pipeline_name", &self.pipeline_name)
            .field("metrics", &self.metrics.is_some())
            .field("logs_enabled", &self.logs_enabled)
            .finish()
    }
}

impl Telemetry {
    pub(crate) fn record_call(&self, service: &str, endpoint: &str, status: &str, duration: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.record_call(service, endpoint, status, duration);
        }
    }

    pub(crate) fn record_retry(&self, service: &str, endpoint: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_retry(service, endpoint);
        }
    }

    pub(crate) fn record_error(&self, service: &str, endpoint: &str, error_type: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_error(service, endpoint, error_type);
        }
    }

    pub(crate) fn set_circuit_breaker_state(&self, service: &str, state: CircuitState) {
        if let Some(metrics) = &self.metrics {
            metrics.set_circuit_breaker_state(service, state);
        }
    }
}
