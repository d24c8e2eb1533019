// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, MeterProvider};
use opentelemetry::{InstrumentationScope, KeyValue};

use super::MetricsSink;
use crate::breaker::CircuitState;

const METER_NAME: &str = "breakwater";
const VERSION: &str = "v0.1.0";
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";

pub(crate) const SERVICE: &str = "service";
pub(crate) const ENDPOINT: &str = "endpoint";
pub(crate) const STATUS: &str = "status";
pub(crate) const ERROR_TYPE: &str = "error.type";

/// A [`MetricsSink`] that reports through OpenTelemetry instruments.
///
/// See the [module documentation][crate::telemetry] for the list of instruments.
///
/// # Examples
///
/// ```rust
/// # use std::sync::Arc;
/// # use tick::Clock;
/// use breakwater::ResilienceContext;
/// use breakwater::telemetry::OpenTelemetryMetrics;
///
/// # fn example(clock: Clock, provider: &dyn opentelemetry::metrics::MeterProvider) {
/// let context = ResilienceContext::new(&clock).metrics(Arc::new(OpenTelemetryMetrics::new(provider)));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OpenTelemetryMetrics {
    calls: Counter<u64>,
    call_duration: Histogram<f64>,
    retries: Counter<u64>,
    errors: Counter<u64>,
    circuit_state: Gauge<u64>,
}

impl OpenTelemetryMetrics {
    /// Creates the instruments on a meter obtained from `provider`.
    #[must_use]
    pub fn new(provider: &dyn MeterProvider) -> Self {
        Self::from_meter(&create_meter(provider))
    }

    fn from_meter(meter: &Meter) -> Self {
        Self {
            calls: meter
                .u64_counter("breakwater.client.calls")
                .with_description("Number of attempts made against an external dependency.")
                .with_unit("{call}")
                .build(),
            call_duration: meter
                .f64_histogram("breakwater.client.call.duration")
                .with_description("Duration of attempts made against an external dependency.")
                .with_unit("s")
                .build(),
            retries: meter
                .u64_counter("breakwater.client.retries")
                .with_description("Number of retries scheduled after a transient failure.")
                .with_unit("{retry}")
                .build(),
            errors: meter
                .u64_counter("breakwater.client.errors")
                .with_description("Number of failures surfaced to the caller.")
                .with_unit("{error}")
                .build(),
            circuit_state: meter
                .u64_gauge("breakwater.circuit_breaker.state")
                .with_description("Circuit breaker state: 0 = closed, 1 = half-open, 2 = open.")
                .build(),
        }
    }
}

impl MetricsSink for OpenTelemetryMetrics {
    fn record_call(&self, service: &str, endpoint: &str, status: &str, duration: Duration) {
        let attributes = [
            KeyValue::new(SERVICE, service.to_owned()),
            KeyValue::new(ENDPOINT, endpoint.to_owned()),
            KeyValue::new(STATUS, status.to_owned()),
        ];

        self.calls.add(1, &attributes);
        self.call_duration.record(duration.as_secs_f64(), &attributes);
    }

    fn record_retry(&self, service: &str, endpoint: &str) {
        self.retries.add(
            1,
            &[
                KeyValue::new(SERVICE, service.to_owned()),
                KeyValue::new(ENDPOINT, endpoint.to_owned()),
            ],
        );
    }

    fn record_error(&self, service: &str, endpoint: &str, error_type: &str) {
        self.errors.add(
            1,
            &[
                KeyValue::new(SERVICE, service.to_owned()),
                KeyValue::new(ENDPOINT, endpoint.to_owned()),
                KeyValue::new(ERROR_TYPE, error_type.to_owned()),
            ],
        );
    }

    fn set_circuit_breaker_state(&self, service: &str, state: CircuitState) {
        self.circuit_state
            .record(state.as_gauge_value(), &[KeyValue::new(SERVICE, service.to_owned())]);
    }
}

fn create_meter(provider: &dyn MeterProvider) -> Meter {
    provider.meter_with_scope(
        InstrumentationScope::builder(METER_NAME)
            .with_version(VERSION)
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
#[cfg(not(miri))]
mod tests {
    use super::*;
    use crate::testing::MetricTester;

    #[test]
    fn assert_definitions() {
        let tester = MetricTester::new();
        let metrics = OpenTelemetryMetrics::new(tester.meter_provider());

        metrics.record_call("billing", "/invoices", "success", Duration::from_millis(12));
        metrics.record_retry("billing", "/invoices");
        metrics.record_error("billing", "/invoices", "timeout");
        metrics.set_circuit_breaker_state("billing", CircuitState::Open);

        let dump = tester.dump();
        assert!(dump.contains("breakwater.client.calls"));
        assert!(dump.contains("breakwater.client.call.duration"));
        assert!(dump.contains("breakwater.client.retries"));
        assert!(dump.contains("breakwater.client.errors"));
        assert!(dump.contains("breakwater.circuit_breaker.state"));
        assert!(dump.contains("breakwater"));
        assert!(dump.contains("v0.1.0"));
    }

    #[test]
    fn record_call_attributes() {
        let tester = MetricTester::new();
        let metrics = OpenTelemetryMetrics::new(tester.meter_provider());

        metrics.record_call("billing", "/invoices", "server_error", Duration::from_millis(5));

        tester.assert_attributes_contain(&[
            KeyValue::new(SERVICE, "billing"),
            KeyValue::new(ENDPOINT, "/invoices"),
            KeyValue::new(STATUS, "server_error"),
        ]);
    }

    #[test]
    fn record_error_attributes() {
        let tester = MetricTester::new();
        let metrics = OpenTelemetryMetrics::new(tester.meter_provider());

        metrics.record_error("billing", "/invoices", "rate_limited");

        tester.assert_attributes_contain(&[
            KeyValue::new(SERVICE, "billing"),
            KeyValue::new(ERROR_TYPE, "rate_limited"),
        ]);
    }

    #[test]
    fn circuit_state_attributes() {
        let tester = MetricTester::new();
        let metrics = OpenTelemetryMetrics::new(tester.meter_provider());

        metrics.set_circuit_breaker_state("inventory", CircuitState::HalfOpen);

        tester.assert_attributes_contain(&[KeyValue::new(SERVICE, "inventory")]);
    }
}
