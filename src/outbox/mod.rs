pub mod record;
pub mod relay;

pub use record::{outbox_table, MalformedOutboxRecord, OutboxRecord};
pub use relay::{DrainReport, OutboxRelay};
