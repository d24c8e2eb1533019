// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(miri, expect(dead_code, reason = "too much noise to satisfy Miri's expectations"))]

//! Test utilities for telemetry validation.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, Metric, MetricData, ResourceMetrics, ScopeMetrics};
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};
use tracing_subscriber::fmt::MakeWriter;

use crate::breaker::CircuitState;
use crate::telemetry::MetricsSink;

/// A metric reported through [`RecordingMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MetricEvent {
    Call {
        service: String,
        endpoint: String,
        status: String,
        duration: Duration,
    },
    Retry {
        service: String,
        endpoint: String,
    },
    Error {
        service: String,
        endpoint: String,
        error_type: String,
    },
    State {
        service: String,
        state: CircuitState,
    },
}

/// A [`MetricsSink`] that remembers every reported metric in order.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingMetrics {
    events: Arc<Mutex<Vec<MetricEvent>>>,
}

impl RecordingMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn into_sink(self) -> Arc<dyn MetricsSink> {
        Arc::new(self)
    }

    #[must_use]
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: MetricEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl MetricsSink for RecordingMetrics {
    fn record_call(&self, service: &str, endpoint: &str, status: &str, duration: Duration) {
        self.push(MetricEvent::Call {
            service: service.to_owned(),
            endpoint: endpoint.to_owned(),
            status: status.to_owned(),
            duration,
        });
    }

    fn record_retry(&self, service: &str, endpoint: &str) {
        self.push(MetricEvent::Retry {
            service: service.to_owned(),
            endpoint: endpoint.to_owned(),
        });
    }

    fn record_error(&self, service: &str, endpoint: &str, error_type: &str) {
        self.push(MetricEvent::Error {
            service: service.to_owned(),
            endpoint: endpoint.to_owned(),
            error_type: error_type.to_owned(),
        });
    }

    fn set_circuit_breaker_state(&self, service: &str, state: CircuitState) {
        self.push(MetricEvent::State {
            service: service.to_owned(),
            state,
        });
    }
}

/// Test helper for collecting and asserting on `OTel` metrics.
#[derive(Debug)]
pub(crate) struct MetricTester {
    exporter: InMemoryMetricExporter,
    provider: SdkMeterProvider,
}

impl Default for MetricTester {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricTester {
    #[must_use]
    pub fn new() -> Self {
        let in_memory = InMemoryMetricExporter::default();

        Self {
            exporter: in_memory.clone(),
            provider: SdkMeterProvider::builder().with_periodic_exporter(in_memory).build(),
        }
    }

    #[must_use]
    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.provider
    }

    /// Returns one line per exported metric: `scope version metric`.
    #[must_use]
    pub fn dump(&self) -> String {
        self.provider.force_flush().unwrap();

        let mut dump = String::new();

        for resource in self.exporter.get_finished_metrics().unwrap() {
            for scope in resource.scope_metrics() {
                for metric in scope.metrics() {
                    _ = writeln!(
                        dump,
                        "{} {} {}",
                        scope.scope().name(),
                        scope.scope().version().unwrap_or_default(),
                        metric.name()
                    );
                }
            }
        }

        dump
    }

    #[must_use]
    pub fn collect_attributes(&self) -> Vec<KeyValue> {
        self.provider.force_flush().unwrap();

        self.exporter
            .get_finished_metrics()
            .unwrap()
            .iter()
            .flat_map(ResourceMetrics::scope_metrics)
            .flat_map(ScopeMetrics::metrics)
            .flat_map(collect_attributes_for_metric)
            .collect()
    }

    pub fn assert_attributes_contain(&self, key_values: &[KeyValue]) {
        let attributes = self.collect_attributes();

        for attr in key_values {
            assert!(
                attributes.contains(attr),
                "attribute {attr:?} not found in collected attributes: {attributes:?}"
            );
        }
    }
}

fn collect_attributes_for_metric(metric: &Metric) -> Vec<KeyValue> {
    macro_rules! attributes {
        ($data:expr) => {
            match $data {
                MetricData::Gauge(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
                MetricData::Sum(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
                MetricData::Histogram(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
                MetricData::ExponentialHistogram(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
            }
        };
    }

    match metric.data() {
        AggregatedMetrics::F64(data) => attributes!(data),
        AggregatedMetrics::U64(data) => attributes!(data),
        AggregatedMetrics::I64(data) => attributes!(data),
    }
}

/// Captures formatted log output into a shared buffer.
///
/// Install with `tracing::subscriber::set_default(capture.subscriber())` for thread-local
/// capture.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).to_string()
    }

    pub fn assert_contains(&self, expected: &str) {
        let output = self.output();
        assert!(
            output.contains(expected),
            "log output does not contain '{expected}', got:\n{output}"
        );
    }

    #[must_use]
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        use tracing_subscriber::layer::SubscriberExt;

        tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_writer(self.clone())
                .with_ansi(false),
        )
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

/// Writer that appends to a shared buffer.
#[derive(Debug)]
pub(crate) struct LogCaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
