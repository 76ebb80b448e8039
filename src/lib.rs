// ============================================================================
// Customer Service - Persistence & Notification Core
// ============================================================================
//
// Layers (leaf-first):
// - domain/    - Customer entity, change commands, error taxonomy
// - store/     - Entity codec, key-value store port + adapters, gateway
// - messaging/ - Event bus port + adapters, event publisher
// - service/   - Orchestrator (create / get / list / delete)
// - outbox/    - Relay that drains pending events in outbox delivery mode
// - utils/     - Retry with backoff, circuit breaker
// - metrics/   - Prometheus registry and HTTP endpoint
// - health     - component health derived from the metrics
// - config     - environment-driven configuration
//
// ============================================================================

pub mod config;
pub mod domain;
pub mod health;
pub mod messaging;
pub mod metrics;
pub mod outbox;
pub mod service;
pub mod store;
pub mod utils;

pub use config::Config;
pub use domain::customer::{ChangeCommand, ChangeType, Customer, CustomerError, NewCustomer};
pub use service::{CustomerService, DeliveryMode};
