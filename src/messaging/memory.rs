use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::customer::ChangeCommand;

use super::{BusEntry, BusError, EntryResult, EventBus};

/// Process-local event bus for local runs (BUS_BACKEND=memory) and tests.
/// Keeps every accepted entry in submission order.
///
/// Failures can be injected:
/// - `reject_next`: the submission goes through but entries come back failed
/// - `fail_submission_next`: the whole submission fails
pub struct InMemoryEventBus {
    accepted: Mutex<Vec<BusEntry>>,
    rejections: Mutex<u32>,
    submission_failures: Mutex<u32>,
    latency: Option<Duration>,
    put_calls: AtomicU64,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Code reported for injected per-entry rejections.
    pub const REJECTION_CODE: &'static str = "InternalFailure";

    pub fn new() -> Self {
        Self {
            accepted: Mutex::new(Vec::new()),
            rejections: Mutex::new(0),
            submission_failures: Mutex::new(0),
            latency: None,
            put_calls: AtomicU64::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reject the next `count` entries.
    pub async fn reject_next(&self, count: u32) {
        *self.rejections.lock().await = count;
    }

    /// Fail the next `count` submissions outright.
    pub async fn fail_submission_next(&self, count: u32) {
        *self.submission_failures.lock().await = count;
    }

    pub async fn entries(&self) -> Vec<BusEntry> {
        self.accepted.lock().await.clone()
    }

    /// Accepted payloads decoded back into change commands; entries that do
    /// not decode are left out.
    pub async fn commands(&self) -> Vec<ChangeCommand> {
        self.accepted
            .lock()
            .await
            .iter()
            .filter_map(|entry| ChangeCommand::from_payload(&entry.detail).ok())
            .collect()
    }

    pub fn put_calls(&self) -> u64 {
        self.put_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn put_entries(&self, entries: Vec<BusEntry>) -> Result<Vec<EntryResult>, BusError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        {
            let mut failures = self.submission_failures.lock().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(BusError::new("injected submission failure"));
            }
        }

        let mut rejections = self.rejections.lock().await;
        let mut accepted = self.accepted.lock().await;
        let results = entries
            .into_iter()
            .map(|entry| {
                if *rejections > 0 {
                    *rejections -= 1;
                    tracing::debug!(event_id = %entry.id, "Injected entry rejection");
                    EntryResult::Failed {
                        code: Self::REJECTION_CODE.to_string(),
                        message: format!("entry {} rejected", entry.id),
                    }
                } else {
                    let event_id = entry.id.clone();
                    accepted.push(entry);
                    EntryResult::Accepted { event_id }
                }
            })
            .collect();

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, customer_id: &str) -> BusEntry {
        BusEntry {
            id: id.to_string(),
            source: "customer-service".to_string(),
            detail_type: "CustomerCommand".to_string(),
            topic: "customer-events".to_string(),
            partition_key: customer_id.to_string(),
            detail: ChangeCommand::add(customer_id).to_payload().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_results_follow_submission_order() {
        let bus = InMemoryEventBus::new();
        bus.reject_next(1).await;

        let results = bus
            .put_entries(vec![entry("e1", "c-1"), entry("e2", "c-2")])
            .await
            .unwrap();

        assert!(matches!(results[0], EntryResult::Failed { .. }));
        assert_eq!(results[1], EntryResult::Accepted { event_id: "e2".to_string() });
        assert_eq!(bus.commands().await, vec![ChangeCommand::add("c-2")]);
        assert_eq!(bus.put_calls(), 1);
    }

    #[tokio::test]
    async fn test_submission_failure_is_consumed() {
        let bus = InMemoryEventBus::new();
        bus.fail_submission_next(1).await;

        assert!(bus.put_entries(vec![entry("e1", "c-1")]).await.is_err());
        assert!(bus.put_entries(vec![entry("e1", "c-1")]).await.is_ok());
        assert_eq!(bus.entries().await.len(), 1);
    }
}
