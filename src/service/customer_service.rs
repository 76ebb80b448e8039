use std::sync::Arc;

use crate::config::DeliveryMode;
use crate::domain::customer::{ChangeCommand, Customer, CustomerError, NewCustomer};
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::outbox::OutboxRecord;
use crate::store::CustomerGateway;

// ============================================================================
// Customer Service - create / get / list / delete
// ============================================================================
//
// Composes the gateway and the publisher. Mutations notify downstream
// consumers with an ADD or DELETE change command:
//
// Direct mode:
//   store write -> publish. A failed write sends nothing; a failed publish
//   is returned to the caller and the write stays in place (no rollback).
//
// Outbox mode:
//   store write + outbox record in one transaction. Nothing is published
//   here; the outbox relay delivers later.
//
// No update operation exists.
//
// ============================================================================

pub struct CustomerService {
    gateway: Arc<CustomerGateway>,
    publisher: Arc<EventPublisher>,
    mode: DeliveryMode,
    metrics: Arc<Metrics>,
}

impl CustomerService {
    pub fn new(
        gateway: Arc<CustomerGateway>,
        publisher: Arc<EventPublisher>,
        mode: DeliveryMode,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            gateway,
            publisher,
            mode,
            metrics,
        }
    }

    pub async fn list(&self) -> Result<Vec<Customer>, CustomerError> {
        let result = self.gateway.scan_all().await;
        self.record("list", &result);

        if let Ok(customers) = &result {
            tracing::debug!(count = customers.len(), "Listed customers");
        }
        result
    }

    pub async fn get(&self, id: &str) -> Result<Customer, CustomerError> {
        let result = self.gateway.get(id).await;
        self.record("get", &result);
        result
    }

    /// Register a new customer. The returned value carries the assigned id
    /// and registration date.
    pub async fn create(&self, input: NewCustomer) -> Result<Customer, CustomerError> {
        let customer = Customer::register(input);
        let result = self.store_and_notify_add(&customer).await;
        self.record("create", &result);

        result.map(|()| {
            tracing::info!(customer_id = %customer.id, mode = ?self.mode, "✅ Customer created");
            customer
        })
    }

    /// Remove a customer, returning its last stored state.
    pub async fn delete(&self, id: &str) -> Result<Customer, CustomerError> {
        let result = self.remove_and_notify_delete(id).await;
        self.record("delete", &result);

        if result.is_ok() {
            tracing::info!(customer_id = %id, mode = ?self.mode, "🗑️  Customer deleted");
        }
        result
    }

    async fn store_and_notify_add(&self, customer: &Customer) -> Result<(), CustomerError> {
        let command = ChangeCommand::add(customer.id.clone());

        match self.mode {
            DeliveryMode::Direct => {
                self.gateway.put(customer).await?;
                self.notify(&command).await
            }
            DeliveryMode::Outbox => {
                let record = OutboxRecord::new(command);
                self.gateway.put_with_outbox(customer, &record).await?;
                tracing::debug!(customer_id = %customer.id, event_id = %record.event_id, "Queued ADD in outbox");
                Ok(())
            }
        }
    }

    async fn remove_and_notify_delete(&self, id: &str) -> Result<Customer, CustomerError> {
        let snapshot = self.gateway.get(id).await?;
        let command = ChangeCommand::delete(id);

        match self.mode {
            DeliveryMode::Direct => {
                self.gateway.delete(id).await?;
                self.notify(&command).await?;
            }
            DeliveryMode::Outbox => {
                let record = OutboxRecord::new(command);
                self.gateway.delete_with_outbox(id, &record).await?;
                tracing::debug!(customer_id = %id, event_id = %record.event_id, "Queued DELETE in outbox");
            }
        }
        Ok(snapshot)
    }

    async fn notify(&self, command: &ChangeCommand) -> Result<(), CustomerError> {
        if let Err(e) = self.publisher.publish(command).await {
            tracing::error!(
                customer_id = %command.id,
                event_type = %command.change_type,
                code = %e.code,
                "Store write committed but change command was not published"
            );
            return Err(e.into());
        }
        Ok(())
    }

    fn record<T>(&self, operation: &str, result: &Result<T, CustomerError>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        self.metrics.record_operation(operation, outcome);
    }
}
