mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::utils::CircuitState;

pub use server::start_metrics_server;

// ============================================================================
// Metrics - Prometheus metrics for the customer service
// ============================================================================
//
// - Customer operations by outcome
// - Store call latency and retries
// - Event publication successes / failures
// - Outbox backlog and relay throughput
// - Event bus circuit breaker state
//
// Scraped via GET /metrics on the metrics server.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub customer_operations: IntCounterVec,

    pub store_call_duration: HistogramVec,
    pub retry_attempts_total: IntCounterVec,

    pub events_published: IntCounterVec,
    pub events_failed: IntCounterVec,

    pub outbox_relayed: IntCounter,
    pub outbox_pending: IntGauge,

    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let customer_operations = IntCounterVec::new(
            Opts::new("customer_operations_total", "Customer operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(customer_operations.clone()))?;

        let store_call_duration = HistogramVec::new(
            HistogramOpts::new("store_call_duration_seconds", "Key-value store call duration, retries included")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(store_call_duration.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Retry attempts beyond the first"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Change commands accepted by the bus"),
            &["event_type"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let events_failed = IntCounterVec::new(
            Opts::new("events_failed_total", "Change commands the bus did not accept"),
            &["event_type", "code"],
        )?;
        registry.register(Box::new(events_failed.clone()))?;

        let outbox_relayed = IntCounter::new("outbox_relayed_total", "Outbox records delivered and cleared")?;
        registry.register(Box::new(outbox_relayed.clone()))?;

        let outbox_pending = IntGauge::new("outbox_pending", "Outbox records left after the last relay pass")?;
        registry.register(Box::new(outbox_pending.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Event bus circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            customer_operations,
            store_call_duration,
            retry_attempts_total,
            events_published,
            events_failed,
            outbox_relayed,
            outbox_pending,
            circuit_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_operation(&self, operation: &str, outcome: &str) {
        self.customer_operations.with_label_values(&[operation, outcome]).inc();
    }

    pub fn observe_store_call(&self, operation: &str, duration_secs: f64) {
        self.store_call_duration.with_label_values(&[operation]).observe(duration_secs);
    }

    pub fn record_retry_attempt(&self, operation: &str) {
        self.retry_attempts_total.with_label_values(&[operation]).inc();
    }

    pub fn record_publish(&self, event_type: &str, failure_code: Option<&str>) {
        match failure_code {
            None => self.events_published.with_label_values(&[event_type]).inc(),
            Some(code) => self.events_failed.with_label_values(&[event_type, code]).inc(),
        }
    }

    pub fn record_outbox_pass(&self, relayed: u64, pending: usize) {
        self.outbox_relayed.inc_by(relayed);
        self.outbox_pending.set(pending as i64);
    }

    pub fn update_circuit_breaker_state(&self, state: CircuitState) {
        self.circuit_breaker_state.set(state.as_gauge());
    }

    pub fn circuit_state(&self) -> CircuitState {
        CircuitState::from_gauge(self.circuit_breaker_state.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_record_operation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_operation("create", "ok");
        metrics.record_operation("create", "ok");
        metrics.record_operation("get", "not_found");

        assert_eq!(metrics.customer_operations.with_label_values(&["create", "ok"]).get(), 2);
        assert_eq!(metrics.customer_operations.with_label_values(&["get", "not_found"]).get(), 1);
    }

    #[test]
    fn test_record_publish() {
        let metrics = Metrics::new().unwrap();
        metrics.record_publish("ADD", None);
        metrics.record_publish("DELETE", Some("ThrottlingException"));

        assert_eq!(metrics.events_published.with_label_values(&["ADD"]).get(), 1);
        assert_eq!(
            metrics.events_failed.with_label_values(&["DELETE", "ThrottlingException"]).get(),
            1
        );
    }

    #[test]
    fn test_outbox_and_circuit_gauges() {
        let metrics = Metrics::new().unwrap();
        metrics.record_outbox_pass(3, 2);
        metrics.record_outbox_pass(2, 0);
        metrics.update_circuit_breaker_state(CircuitState::HalfOpen);

        assert_eq!(metrics.outbox_relayed.get(), 5);
        assert_eq!(metrics.outbox_pending.get(), 0);
        assert_eq!(metrics.circuit_state(), CircuitState::HalfOpen);
    }
}
