use async_trait::async_trait;
use futures_util::future::join_all;
use rdkafka::{
    config::ClientConfig,
    error::KafkaError,
    message::{Header, OwnedHeaders},
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RedpandaConfig;
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

use super::{codes, BusEntry, BusError, EntryResult, EventBus};

/// Redpanda (Kafka protocol) event bus. Each entry becomes one record on its
/// topic, keyed by the partition key so events for a customer stay ordered.
/// Envelope fields travel as headers.
pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    send_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl RedpandaClient {
    pub fn new(config: &RedpandaConfig, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .set("enable.idempotence", "true")
            .create()?;

        // Open after 5 consecutive failures, probe again after 30s, close
        // after 3 successful probes.
        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            success_threshold: 3,
        };

        tracing::info!(brokers = %config.brokers, "Redpanda producer created");

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new(cb_config),
            send_timeout: Duration::from_millis(u64::from(config.message_timeout_ms)),
            metrics,
        })
    }

    async fn send(&self, entry: &BusEntry) -> EntryResult {
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "event-id",
                value: Some(entry.id.as_str()),
            })
            .insert(Header {
                key: "source",
                value: Some(entry.source.as_str()),
            })
            .insert(Header {
                key: "detail-type",
                value: Some(entry.detail_type.as_str()),
            });

        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(&entry.topic)
                    .key(&entry.partition_key)
                    .payload(&entry.detail)
                    .headers(headers);

                self.producer
                    .send(record, Timeout::After(self.send_timeout))
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| e)
            })
            .await;

        self.metrics
            .update_circuit_breaker_state(self.circuit_breaker.state().await);

        match result {
            Ok(()) => {
                tracing::debug!(
                    event_id = %entry.id,
                    topic = %entry.topic,
                    key = %entry.partition_key,
                    "Published to Redpanda"
                );
                EntryResult::Accepted {
                    event_id: entry.id.clone(),
                }
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(
                    event_id = %entry.id,
                    topic = %entry.topic,
                    "Circuit breaker open - Redpanda unavailable"
                );
                EntryResult::Failed {
                    code: codes::CIRCUIT_OPEN.to_string(),
                    message: "circuit breaker open for Redpanda".to_string(),
                }
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(
                    error = %e,
                    event_id = %entry.id,
                    topic = %entry.topic,
                    "Failed to publish to Redpanda"
                );
                EntryResult::Failed {
                    code: kafka_error_code(&e),
                    message: e.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl EventBus for RedpandaClient {
    async fn put_entries(&self, entries: Vec<BusEntry>) -> Result<Vec<EntryResult>, BusError> {
        if entries.is_empty() {
            return Err(BusError::new("empty submission"));
        }
        Ok(join_all(entries.iter().map(|entry| self.send(entry))).await)
    }
}

fn kafka_error_code(error: &KafkaError) -> String {
    match error.rdkafka_error_code() {
        Some(code) => format!("{code:?}"),
        None => codes::SUBMISSION_FAILED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::error::RDKafkaErrorCode;

    #[test]
    fn test_kafka_error_code_uses_broker_code() {
        let err = KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut);
        assert_eq!(kafka_error_code(&err), "MessageTimedOut");
    }

    #[test]
    fn test_kafka_error_without_code() {
        let err = KafkaError::Canceled;
        assert_eq!(kafka_error_code(&err), codes::SUBMISSION_FAILED);
    }
}
