// ============================================================================
// Store Layer
// ============================================================================
//
// - kv:      the key-value store port (attribute maps in, attribute maps out)
// - codec:   Customer <-> attribute map
// - gateway: customer persistence over any KeyValueStore (timeouts + retry)
// - scylla_store: ScyllaDB adapter
// - memory:  process-local adapter for local runs and tests
//
// ============================================================================

mod codec;
mod gateway;
mod kv;
pub mod memory;
pub mod scylla_store;

pub use codec::{AttributeNames, CustomerCodec, DecodeError, DecodeErrorKind};
pub use gateway::CustomerGateway;
pub use kv::{AttributeMap, AttributeValue, KeyValueStore, ScanPage, StoreError, TableDef, WriteOp};
pub use memory::InMemoryStore;
pub use scylla_store::ScyllaStore;
