//! Configuration management for the customer service.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::store::AttributeNames;
use crate::utils::RetryConfig;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// ScyllaDB connection
    pub scylla: ScyllaConfig,
    /// Customer and outbox tables, call bounds
    pub store: StoreConfig,
    /// Event envelope and bus call bounds
    pub bus: BusConfig,
    /// Redpanda producer
    pub redpanda: RedpandaConfig,
    /// How create/delete deliver change commands
    pub delivery: DeliveryMode,
    /// Outbox relay
    pub outbox: OutboxConfig,
    /// Metrics / health endpoint
    pub metrics: MetricsConfig,
}

/// Which key-value store adapter backs the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Scylla,
    Memory,
}

/// Which event bus adapter backs the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusBackend {
    Redpanda,
    Memory,
}

/// How create/delete hand their change command to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Write, then publish synchronously; a failed publish is surfaced to the
    /// caller and the write stays in place.
    #[default]
    Direct,
    /// Write the entity and a pending-event record in one transaction; the
    /// outbox relay publishes later.
    Outbox,
}

#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    /// Contact points (comma-separated host:port)
    pub nodes: Vec<String>,
    pub keyspace: String,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub customer_table: String,
    pub outbox_table: String,
    pub attributes: AttributeNames,
    /// Items requested per scan page
    pub page_size: usize,
    /// Bound on a single store call, each retry attempt included
    pub call_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Scylla,
            customer_table: "Customer".to_string(),
            outbox_table: "CustomerOutbox".to_string(),
            attributes: AttributeNames::default(),
            page_size: 100,
            call_timeout: Duration::from_millis(2000),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub backend: BusBackend,
    pub topic: String,
    pub source: String,
    pub detail_type: String,
    /// Bound on a single submission
    pub call_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::Redpanda,
            topic: "customer-events".to_string(),
            source: "customer-service".to_string(),
            detail_type: "CustomerCommand".to_string(),
            call_timeout: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedpandaConfig {
    /// Broker addresses (comma-separated)
    pub brokers: String,
    /// librdkafka `message.timeout.ms`
    pub message_timeout_ms: u32,
}

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub poll_interval: Duration,
    /// Backoff for each record within a relay pass
    pub retry: RetryConfig,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid value {value:?} for {variable}: expected one of {expected}")]
pub struct ConfigError {
    pub variable: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scylla" => Ok(StoreBackend::Scylla),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

impl FromStr for BusBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redpanda" | "kafka" => Ok(BusBackend::Redpanda),
            "memory" => Ok(BusBackend::Memory),
            _ => Err(()),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(DeliveryMode::Direct),
            "outbox" => Ok(DeliveryMode::Outbox),
            _ => Err(()),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };

        let store_defaults = StoreConfig::default();
        let bus_defaults = BusConfig::default();

        let store_backend: StoreBackend = choice(&lookup, "STORE_BACKEND", "scylla", "scylla | memory")?;
        let bus_backend: BusBackend = choice(&lookup, "BUS_BACKEND", "redpanda", "redpanda | memory")?;
        let delivery: DeliveryMode = choice(&lookup, "DELIVERY_MODE", "direct", "direct | outbox")?;

        Ok(Self {
            scylla: ScyllaConfig {
                nodes: string("SCYLLA_NODES", "127.0.0.1:9042")
                    .split(',')
                    .map(str::trim)
                    .filter(|node| !node.is_empty())
                    .map(str::to_string)
                    .collect(),
                keyspace: string("SCYLLA_KEYSPACE", "customers_ks"),
            },
            store: StoreConfig {
                backend: store_backend,
                customer_table: string("CUSTOMER_TABLE", &store_defaults.customer_table),
                outbox_table: string("OUTBOX_TABLE", &store_defaults.outbox_table),
                attributes: AttributeNames::default(),
                page_size: (number("STORE_PAGE_SIZE", 100) as usize).max(1),
                call_timeout: Duration::from_millis(number("STORE_CALL_TIMEOUT_MS", 2000).max(1)),
                retry: RetryConfig {
                    max_attempts: (number("STORE_RETRY_MAX_ATTEMPTS", 3) as u32).max(1),
                    initial_delay: Duration::from_millis(number("STORE_RETRY_INITIAL_DELAY_MS", 100)),
                    ..store_defaults.retry
                },
            },
            bus: BusConfig {
                backend: bus_backend,
                topic: string("EVENT_TOPIC", &bus_defaults.topic),
                source: string("EVENT_SOURCE", &bus_defaults.source),
                detail_type: string("EVENT_DETAIL_TYPE", &bus_defaults.detail_type),
                call_timeout: Duration::from_millis(number("BUS_CALL_TIMEOUT_MS", 5000).max(1)),
            },
            redpanda: RedpandaConfig {
                brokers: string("REDPANDA_BROKERS", "127.0.0.1:9092"),
                message_timeout_ms: 5000,
            },
            delivery,
            outbox: OutboxConfig {
                poll_interval: Duration::from_millis(number("OUTBOX_POLL_INTERVAL_MS", 1000)),
                retry: RetryConfig::aggressive(),
            },
            metrics: MetricsConfig {
                port: lookup("METRICS_PORT")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(9090),
            },
        })
    }
}

fn choice<T, F>(lookup: &F, variable: &'static str, default: &str, expected: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(variable).unwrap_or_else(|| default.to_string());
    value.trim().parse().map_err(|_| ConfigError {
        variable,
        value,
        expected,
    })
}
