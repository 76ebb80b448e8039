use std::sync::Arc;
use uuid::Uuid;

use crate::config::BusConfig;
use crate::domain::customer::ChangeCommand;
use crate::metrics::Metrics;

use super::{codes, BusEntry, EntryResult, EventBus, PublishError};

/// Delivers single change commands to the bus. Best-effort and synchronous:
/// no retry here, the caller decides what a failure means.
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    config: BusConfig,
    metrics: Arc<Metrics>,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>, config: BusConfig, metrics: Arc<Metrics>) -> Self {
        Self { bus, config, metrics }
    }

    /// Publish under a fresh event id, returned on success.
    pub async fn publish(&self, command: &ChangeCommand) -> Result<String, PublishError> {
        let event_id = Uuid::new_v4().to_string();
        self.publish_with_id(command, &event_id).await?;
        Ok(event_id)
    }

    /// Publish under a caller-chosen event id, so redeliveries are
    /// recognisable downstream.
    pub async fn publish_with_id(&self, command: &ChangeCommand, event_id: &str) -> Result<(), PublishError> {
        let result = self.submit(command, event_id).await;

        match &result {
            Ok(()) => {
                self.metrics.record_publish(command.change_type.as_str(), None);
                tracing::info!(
                    event_id = %event_id,
                    event_type = %command.change_type,
                    customer_id = %command.id,
                    "📤 Published change command"
                );
            }
            Err(e) => {
                self.metrics
                    .record_publish(command.change_type.as_str(), Some(e.code.as_str()));
                tracing::warn!(
                    event_id = %event_id,
                    event_type = %command.change_type,
                    customer_id = %command.id,
                    code = %e.code,
                    error = %e.message,
                    "Change command not accepted by the bus"
                );
            }
        }
        result
    }

    async fn submit(&self, command: &ChangeCommand, event_id: &str) -> Result<(), PublishError> {
        let detail = command
            .to_payload()
            .map_err(|e| PublishError::new(codes::SERIALIZATION_FAILED, e.to_string()))?;

        let entry = BusEntry {
            id: event_id.to_string(),
            source: self.config.source.clone(),
            detail_type: self.config.detail_type.clone(),
            topic: self.config.topic.clone(),
            partition_key: command.id.clone(),
            detail,
        };

        let results = tokio::time::timeout(self.config.call_timeout, self.bus.put_entries(vec![entry]))
            .await
            .map_err(|_| {
                PublishError::new(
                    codes::TIMEOUT,
                    format!("no answer from the bus within {:?}", self.config.call_timeout),
                )
            })?
            .map_err(|e| PublishError::new(codes::SUBMISSION_FAILED, e.message))?;

        if results.is_empty() {
            return Err(PublishError::new(
                codes::MISSING_ENTRY_RESULT,
                "bus accepted the submission but returned no entry result",
            ));
        }

        for result in results {
            if let EntryResult::Failed { code, message } = result {
                return Err(PublishError::new(code, message));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryEventBus;
    use std::time::Duration;

    fn publisher_over(bus: Arc<InMemoryEventBus>) -> (EventPublisher, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new().unwrap());
        let config = BusConfig {
            call_timeout: Duration::from_millis(100),
            ..BusConfig::default()
        };
        (EventPublisher::new(bus, config, metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn test_publish_submits_one_entry() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (publisher, metrics) = publisher_over(bus.clone());

        let event_id = publisher.publish(&ChangeCommand::add("c-1")).await.unwrap();

        let entries = bus.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, event_id);
        assert_eq!(entries[0].source, "customer-service");
        assert_eq!(entries[0].detail_type, "CustomerCommand");
        assert_eq!(entries[0].topic, "customer-events");
        assert_eq!(entries[0].partition_key, "c-1");
        assert_eq!(entries[0].detail, r#"{"type":"ADD","id":"c-1"}"#);
        assert_eq!(metrics.events_published.with_label_values(&["ADD"]).get(), 1);
    }

    #[tokio::test]
    async fn test_rejected_entry_surfaces_bus_code() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (publisher, metrics) = publisher_over(bus.clone());

        bus.reject_next(1).await;
        let err = publisher.publish(&ChangeCommand::delete("c-1")).await.unwrap_err();

        assert_eq!(err.code, InMemoryEventBus::REJECTION_CODE);
        assert!(bus.entries().await.is_empty());
        assert_eq!(
            metrics
                .events_failed
                .with_label_values(&["DELETE", InMemoryEventBus::REJECTION_CODE])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_failed_submission() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (publisher, _) = publisher_over(bus.clone());

        bus.fail_submission_next(1).await;
        let err = publisher.publish(&ChangeCommand::add("c-1")).await.unwrap_err();

        assert_eq!(err.code, codes::SUBMISSION_FAILED);
    }

    #[tokio::test]
    async fn test_slow_bus_times_out() {
        let bus = Arc::new(InMemoryEventBus::new().with_latency(Duration::from_millis(500)));
        let (publisher, _) = publisher_over(bus);

        let err = publisher.publish(&ChangeCommand::add("c-1")).await.unwrap_err();

        assert_eq!(err.code, codes::TIMEOUT);
    }

    #[tokio::test]
    async fn test_publish_with_id_keeps_the_id() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (publisher, _) = publisher_over(bus.clone());

        publisher
            .publish_with_id(&ChangeCommand::add("c-1"), "evt-1")
            .await
            .unwrap();
        publisher
            .publish_with_id(&ChangeCommand::add("c-1"), "evt-1")
            .await
            .unwrap();

        let ids: Vec<String> = bus.entries().await.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["evt-1".to_string(), "evt-1".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_result_list_is_a_failure() {
        struct SilentBus;

        #[async_trait::async_trait]
        impl EventBus for SilentBus {
            async fn put_entries(&self, _entries: Vec<BusEntry>) -> Result<Vec<EntryResult>, crate::messaging::BusError> {
                Ok(Vec::new())
            }
        }

        let metrics = Arc::new(Metrics::new().unwrap());
        let publisher = EventPublisher::new(Arc::new(SilentBus), BusConfig::default(), metrics);

        let err = publisher.publish(&ChangeCommand::add("c-1")).await.unwrap_err();
        assert_eq!(err.code, codes::MISSING_ENTRY_RESULT);
    }
}
