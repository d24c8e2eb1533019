// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::Arc;

use tick::Clock;

use crate::CallContext;
use crate::telemetry::{MetricsSink, Telemetry};

pub(crate) const DEFAULT_PIPELINE_NAME: &str = "default";

/// Shared configuration and dependencies for the resilience components of one client.
///
/// Pass a single `ResilienceContext` to the circuit breaker, retryer and timeout manager of a
/// client so they share a clock and telemetry configuration.
#[derive(Clone)]
pub struct ResilienceContext {
    clock: Clock,
    name: Cow<'static, str>,
    metrics: Option<Arc<dyn MetricsSink>>,
    logs_enabled: bool,
}

impl Debug for ResilienceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceContext")
            .field("clock", &self.clock)
            .field("name", &self.name)
            .field("metrics", &self.metrics.is_some())
            .field("logs_enabled", &self.logs_enabled)
            .finish()
    }
}

impl ResilienceContext {
    /// Create a context with a clock. Initializes with `name = "default"`.
    #[must_use]
    pub fn new(clock: impl AsRef<Clock>) -> Self {
        Self {
            clock: clock.as_ref().clone(),
            name: Cow::Borrowed(DEFAULT_PIPELINE_NAME),
            metrics: None,
            logs_enabled: false,
        }
    }

    /// Set the name used to correlate logs and metrics. Prefer `snake_case`.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Report metrics to the given sink.
    #[must_use]
    pub fn metrics(self, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            metrics: Some(sink),
            ..self
        }
    }

    /// Report metrics through OpenTelemetry instruments created on the given meter provider.
    #[must_use]
    #[cfg(any(feature = "metrics", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    pub fn enable_metrics(self, provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        self.metrics(Arc::new(crate::telemetry::OpenTelemetryMetrics::new(provider)))
    }

    /// Enable structured logging for resilience events.
    #[must_use]
    #[cfg(any(feature = "logs", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "logs")))]
    pub fn enable_logs(self) -> Self {
        Self {
            logs_enabled: true,
            ..self
        }
    }

    /// Returns the clock used for all time reads and delays.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Creates a root [`CallContext`] on this context's clock.
    #[must_use]
    pub fn call_context(&self) -> CallContext {
        CallContext::new(&self.clock)
    }

    pub(crate) fn telemetry(&self) -> Telemetry {
        Telemetry {
            pipeline_name: self.name.clone(),
            metrics: self.metrics.clone(),
            logs_enabled: self.logs_enabled,
        }
    }
}

impl AsRef<Clock> for ResilienceContext {
    fn as_ref(&self) -> &Clock {
        &self.clock
    }
}
