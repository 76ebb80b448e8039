use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics::Metrics;
use crate::utils::CircuitState;

// ============================================================================
// Health Reporting
// ============================================================================
//
// Derived from the metrics registry so the /health endpoint needs no extra
// wiring into the service:
// - event_bus: circuit breaker state of the bus producer
// - outbox:    backlog left after the last relay pass
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

/// Outbox backlog above which the service reports itself degraded.
const OUTBOX_BACKLOG_WARNING: i64 = 1_000;

pub fn check(metrics: &Metrics) -> SystemHealth {
    let bus = match metrics.circuit_state() {
        CircuitState::Closed => HealthStatus::Healthy,
        CircuitState::HalfOpen => HealthStatus::Degraded("circuit breaker half-open".to_string()),
        CircuitState::Open => HealthStatus::Unhealthy("circuit breaker open".to_string()),
    };

    let pending = metrics.outbox_pending.get();
    let outbox = if pending > OUTBOX_BACKLOG_WARNING {
        HealthStatus::Degraded(format!("{pending} events waiting for delivery"))
    } else {
        HealthStatus::Healthy
    };

    let components = vec![
        ComponentHealth::new("event_bus", bus),
        ComponentHealth::new("outbox", outbox).with_details(format!("pending={pending}")),
    ];

    SystemHealth {
        overall: overall_status(&components),
        components,
        check_time: Utc::now(),
    }
}

fn overall_status(components: &[ComponentHealth]) -> HealthStatus {
    let unhealthy: Vec<String> = components
        .iter()
        .filter_map(|c| match &c.status {
            HealthStatus::Unhealthy(reason) => Some(format!("{}: {}", c.name, reason)),
            _ => None,
        })
        .collect();

    if !unhealthy.is_empty() {
        HealthStatus::Unhealthy(unhealthy.join(", "))
    } else if components.iter().any(|c| matches!(c.status, HealthStatus::Degraded(_))) {
        HealthStatus::Degraded("some components degraded".to_string())
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_by_default() {
        let metrics = Metrics::new().unwrap();
        let health = check(&metrics);

        assert!(health.overall.is_healthy());
        assert_eq!(health.components.len(), 2);
    }

    #[test]
    fn test_open_circuit_is_unhealthy() {
        let metrics = Metrics::new().unwrap();
        metrics.update_circuit_breaker_state(CircuitState::Open);

        let health = check(&metrics);
        assert_eq!(
            health.overall,
            HealthStatus::Unhealthy("event_bus: circuit breaker open".to_string())
        );
    }

    #[test]
    fn test_outbox_backlog_degrades() {
        let metrics = Metrics::new().unwrap();
        metrics.record_outbox_pass(0, 5_000);

        let health = check(&metrics);
        assert!(matches!(health.overall, HealthStatus::Degraded(_)));

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["overall"]["status"], "degraded");
    }
}
