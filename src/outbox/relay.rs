use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::domain::customer::CustomerError;
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::store::CustomerGateway;
use crate::utils::{retry_with_backoff, RetryConfig};

use super::record::OutboxRecord;

// ============================================================================
// Outbox Relay - drains pending change commands to the event bus
// ============================================================================
//
// Each pass:
// 1. Scan the outbox table
// 2. Order records by CreatedAt, then by EventId (v7, so creation order
//    within a millisecond)
// 3. Publish each under its stored EventId, retrying with backoff
// 4. Delete the record once the bus accepted it
//
// A record that still fails after its retries ends the pass, so later events
// for the same customer cannot overtake it. It stays for the next pass.
// Delivery is at-least-once: a crash between publish and delete means the
// next pass publishes the same EventId again.
//
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Delivered and removed from the outbox
    pub published: usize,
    /// Still rejected after retries (at most one per pass)
    pub failed: usize,
    /// Unreadable records, left in place
    pub skipped: usize,
    /// Readable records still waiting after this pass
    pub pending: usize,
}

pub struct OutboxRelay {
    gateway: Arc<CustomerGateway>,
    publisher: Arc<EventPublisher>,
    retry: RetryConfig,
    poll_interval: Duration,
    metrics: Arc<Metrics>,
}

impl OutboxRelay {
    pub fn new(
        gateway: Arc<CustomerGateway>,
        publisher: Arc<EventPublisher>,
        retry: RetryConfig,
        poll_interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            gateway,
            publisher,
            retry,
            poll_interval,
            metrics,
        }
    }

    pub async fn drain_once(&self) -> Result<DrainReport, CustomerError> {
        let mut report = DrainReport::default();
        let mut records: Vec<OutboxRecord> = Vec::new();

        for scanned in self.gateway.scan_outbox().await? {
            match scanned {
                Ok(record) => records.push(record),
                Err(e) => {
                    report.skipped += 1;
                    tracing::warn!(error = %e, "⏭️  Skipping unreadable outbox record");
                }
            }
        }

        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });

        let total = records.len();
        if total > 0 {
            tracing::info!(count = total, "📬 Fetched pending outbox records");
        }

        for record in &records {
            let delivered = retry_with_backoff(self.retry.clone(), |_attempt| {
                self.publisher.publish_with_id(&record.command, &record.event_id)
            })
            .await
            .into_result();

            if let Err(e) = delivered {
                report.failed += 1;
                tracing::error!(
                    event_id = %record.event_id,
                    customer_id = %record.command.id,
                    code = %e.code,
                    error = %e.message,
                    "Outbox record not delivered, stopping pass"
                );
                break;
            }

            self.gateway.remove_outbox(&record.event_id).await?;
            report.published += 1;
        }

        report.pending = total - report.published;
        self.metrics
            .record_outbox_pass(report.published as u64, report.pending);

        Ok(report)
    }

    /// Drain every `poll_interval` until `shutdown` turns true or its sender
    /// is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "🔄 Starting outbox relay"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.drain_once().await {
                        Ok(report) if report.published > 0 || report.failed > 0 => {
                            tracing::info!(
                                published = report.published,
                                failed = report.failed,
                                skipped = report.skipped,
                                pending = report.pending,
                                "Outbox pass finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Outbox pass failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Outbox relay stopped");
    }
}
