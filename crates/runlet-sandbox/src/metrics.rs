//! Prometheus metrics for the Runlet engine.
//!
//! Only compiled when the `metrics` feature is enabled. Counts invocations
//! by tier and outcome and observes handler wall-clock time.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicI64;

/// Label set for invocation metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct InvocationLabels {
    /// The access tier the caller resolved under: "owner", "subscriber",
    /// or "subscribedCollection".
    pub tier: String,
}

/// Label set for failure metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FailureLabels {
    /// The failure kind: "timeout", "heap_limit", "js_error",
    /// "handler_missing", "not_found".
    pub failure_kind: String,
}

/// Prometheus metrics for the Runlet engine.
pub struct RunletMetrics {
    /// Total invocations by access tier.
    pub invocations_total: Family<InvocationLabels, Counter>,
    /// Handler duration in seconds, by access tier.
    pub invocation_duration_seconds: Family<InvocationLabels, Histogram>,
    /// Total failures by kind.
    pub failures_total: Family<FailureLabels, Counter>,
    /// Invocations currently holding a sandbox slot.
    pub invocations_in_flight: Gauge<i64, AtomicI64>,
}

impl RunletMetrics {
    /// Create a new `RunletMetrics` and register all metrics with the given registry.
    pub fn new(registry: &mut Registry) -> Self {
        let invocations_total = Family::default();
        registry.register(
            "runlet_invocations_total",
            "Total function invocations by access tier",
            invocations_total.clone(),
        );

        let invocation_duration_seconds =
            Family::<InvocationLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(
                    [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0].into_iter(),
                )
            });
        registry.register(
            "runlet_invocation_duration_seconds",
            "Handler wall-clock duration",
            invocation_duration_seconds.clone(),
        );

        let failures_total = Family::default();
        registry.register(
            "runlet_failures_total",
            "Total invocation failures by kind",
            failures_total.clone(),
        );

        let invocations_in_flight = Gauge::default();
        registry.register(
            "runlet_invocations_in_flight",
            "Invocations currently holding a sandbox slot",
            invocations_in_flight.clone(),
        );

        Self {
            invocations_total,
            invocation_duration_seconds,
            failures_total,
            invocations_in_flight,
        }
    }

    /// Record one completed invocation.
    pub fn record_invocation(&self, tier: &str, duration_secs: f64) {
        let labels = InvocationLabels {
            tier: tier.to_string(),
        };
        self.invocations_total.get_or_create(&labels).inc();
        self.invocation_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record one failure.
    pub fn record_failure(&self, failure_kind: &str) {
        let labels = FailureLabels {
            failure_kind: failure_kind.to_string(),
        };
        self.failures_total.get_or_create(&labels).inc();
    }
}
