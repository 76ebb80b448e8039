// ============================================================================
// Messaging Layer
// ============================================================================
//
// - EventBus:       submit a batch of entries, get one result per entry
// - EventPublisher: one change command -> one entry, per-entry check
// - redpanda:       Kafka-protocol adapter behind a circuit breaker
// - memory:         process-local adapter for local runs and tests
//
// ============================================================================

pub mod memory;
pub mod publisher;
pub mod redpanda;

use async_trait::async_trait;

pub use memory::InMemoryEventBus;
pub use publisher::EventPublisher;
pub use redpanda::RedpandaClient;

/// Failure codes produced on this side of the bus. Bus-reported codes are
/// passed through unchanged.
pub mod codes {
    pub const SUBMISSION_FAILED: &str = "SubmissionFailed";
    pub const TIMEOUT: &str = "Timeout";
    pub const SERIALIZATION_FAILED: &str = "SerializationFailed";
    pub const MISSING_ENTRY_RESULT: &str = "MissingEntryResult";
    pub const CIRCUIT_OPEN: &str = "CircuitOpen";
}

/// One event as submitted to the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEntry {
    /// Event id; consumers de-duplicate on it
    pub id: String,
    pub source: String,
    pub detail_type: String,
    pub topic: String,
    /// Ordering key (the customer id)
    pub partition_key: String,
    /// Serialized change command
    pub detail: String,
}

/// Per-entry outcome of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryResult {
    Accepted { event_id: String },
    Failed { code: String, message: String },
}

/// The submission as a whole failed; no per-entry results exist.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Bus submission failed: {message}")]
pub struct BusError {
    pub message: String,
}

impl BusError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Event publication failed ({code}): {message}")]
pub struct PublishError {
    pub code: String,
    pub message: String,
}

impl PublishError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Results come back in submission order, one per entry.
    async fn put_entries(&self, entries: Vec<BusEntry>) -> Result<Vec<EntryResult>, BusError>;
}
