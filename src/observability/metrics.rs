use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub booking_operations_total: IntCounterVec,
    pub booking_operation_latency_seconds: HistogramVec,
    pub capacity_drift_total: IntCounter,
    pub tracking_updates_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let booking_operations_total = IntCounterVec::new(
            Opts::new(
                "booking_operations_total",
                "Booking operations by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid booking_operations_total metric");

        let booking_operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "booking_operation_latency_seconds",
                "Latency of booking operations in seconds",
            ),
            &["operation"],
        )
        .expect("valid booking_operation_latency_seconds metric");

        let capacity_drift_total = IntCounter::new(
            "capacity_drift_total",
            "Capacity ledger rows found out of sync with live bookings",
        )
        .expect("valid capacity_drift_total metric");

        let tracking_updates_total = IntCounterVec::new(
            Opts::new("tracking_updates_total", "Tracking updates by kind"),
            &["kind"],
        )
        .expect("valid tracking_updates_total metric");

        registry
            .register(Box::new(booking_operations_total.clone()))
            .expect("register booking_operations_total");
        registry
            .register(Box::new(booking_operation_latency_seconds.clone()))
            .expect("register booking_operation_latency_seconds");
        registry
            .register(Box::new(capacity_drift_total.clone()))
            .expect("register capacity_drift_total");
        registry
            .register(Box::new(tracking_updates_total.clone()))
            .expect("register tracking_updates_total");

        Self {
            registry,
            booking_operations_total,
            booking_operation_latency_seconds,
            capacity_drift_total,
            tracking_updates_total,
        }
    }

    pub fn observe_operation(&self, operation: &str, outcome: &str, elapsed: Duration) {
        self.booking_operations_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.booking_operation_latency_seconds
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_output_contains_recorded_series() {
        let metrics = Metrics::new();
        metrics.observe_operation("create", "ok", Duration::from_millis(3));
        metrics.capacity_drift_total.inc();

        let body = metrics.encode().unwrap();
        assert!(body.contains("booking_operations_total"));
        assert!(body.contains("operation=\"create\""));
        assert!(body.contains("capacity_drift_total 1"));
    }
}
