use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::StoreConfig;
use crate::domain::customer::{Customer, CustomerError};
use crate::metrics::Metrics;
use crate::outbox::{outbox_table, MalformedOutboxRecord, OutboxRecord};
use crate::utils::{retry_on_transient, RetryConfig};

use super::codec::CustomerCodec;
use super::kv::{KeyValueStore, StoreError, TableDef, WriteOp};

// ============================================================================
// Customer Persistence Gateway
// ============================================================================
//
// Customer-level operations over any KeyValueStore:
// - scan_all: every customer, pages followed transparently
// - get:      NotFound is a value, distinct from store failure
// - put:      unconditional overwrite
// - delete:   absent id is not an error here
//
// Plus the transactional writes used in outbox delivery mode and the outbox
// access the relay needs.
//
// Every store call is bounded by `call_timeout` and retried with backoff on
// transient failure. Decode failures and NotFound are never retried.
//
// ============================================================================

pub struct CustomerGateway {
    store: Arc<dyn KeyValueStore>,
    codec: CustomerCodec,
    customers: TableDef,
    outbox: TableDef,
    page_size: usize,
    call_timeout: Duration,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl CustomerGateway {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &StoreConfig, metrics: Arc<Metrics>) -> Self {
        let codec = CustomerCodec::new(config.attributes.clone());
        Self {
            customers: codec.table(&config.customer_table),
            outbox: outbox_table(&config.outbox_table),
            codec,
            store,
            page_size: config.page_size.max(1),
            call_timeout: config.call_timeout,
            retry: config.retry.clone(),
            metrics,
        }
    }

    /// Complete snapshot of the table. Fails as a whole if any page fails or
    /// any item does not decode.
    pub async fn scan_all(&self) -> Result<Vec<Customer>, CustomerError> {
        let mut customers = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .call("scan", || {
                    self.store
                        .scan_page(&self.customers, cursor.as_deref(), self.page_size)
                })
                .await?;
            pages += 1;

            for item in &page.items {
                customers.push(self.codec.decode(item)?);
            }

            match page.last_evaluated_key {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::debug!(count = customers.len(), pages, "Scanned customer table");
        Ok(customers)
    }

    pub async fn get(&self, id: &str) -> Result<Customer, CustomerError> {
        let item = self
            .call("get_item", || self.store.get_item(&self.customers, id))
            .await?;

        match item {
            Some(item) => Ok(self.codec.decode(&item)?),
            None => Err(CustomerError::NotFound(id.to_string())),
        }
    }

    pub async fn put(&self, customer: &Customer) -> Result<(), CustomerError> {
        let item = self
            .codec
            .encode(customer)
            .map_err(|e| StoreError::schema("put_item", e))?;
        self.call("put_item", || self.store.put_item(&self.customers, &item))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), CustomerError> {
        self.call("delete_item", || self.store.delete_item(&self.customers, id))
            .await?;
        Ok(())
    }

    /// Store the customer and its pending ADD event in one transaction.
    pub async fn put_with_outbox(&self, customer: &Customer, record: &OutboxRecord) -> Result<(), CustomerError> {
        let ops = vec![
            WriteOp::Put {
                table: self.customers.clone(),
                item: self
                    .codec
                    .encode(customer)
                    .map_err(|e| StoreError::schema("transact_write", e))?,
            },
            self.outbox_put(record)?,
        ];
        self.call("transact_write", || self.store.transact_write(&ops))
            .await?;
        Ok(())
    }

    /// Remove the customer and store its pending DELETE event in one
    /// transaction.
    pub async fn delete_with_outbox(&self, id: &str, record: &OutboxRecord) -> Result<(), CustomerError> {
        let ops = vec![
            WriteOp::Delete {
                table: self.customers.clone(),
                key: id.to_string(),
            },
            self.outbox_put(record)?,
        ];
        self.call("transact_write", || self.store.transact_write(&ops))
            .await?;
        Ok(())
    }

    /// Every pending outbox record. Items that do not decode are returned as
    /// errors so the caller can report them without losing the rest.
    pub async fn scan_outbox(&self) -> Result<Vec<Result<OutboxRecord, MalformedOutboxRecord>>, CustomerError> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .call("scan", || {
                    self.store
                        .scan_page(&self.outbox, cursor.as_deref(), self.page_size)
                })
                .await?;

            records.extend(page.items.iter().map(OutboxRecord::decode));

            match page.last_evaluated_key {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(records)
    }

    pub async fn remove_outbox(&self, event_id: &str) -> Result<(), CustomerError> {
        self.call("delete_item", || self.store.delete_item(&self.outbox, event_id))
            .await?;
        Ok(())
    }

    fn outbox_put(&self, record: &OutboxRecord) -> Result<WriteOp, StoreError> {
        let item = record
            .encode()
            .map_err(|e| StoreError::schema("transact_write", e))?;
        Ok(WriteOp::Put {
            table: self.outbox.clone(),
            item,
        })
    }

    /// One logical store call: each attempt bounded by `call_timeout`,
    /// transient failures retried per `retry`.
    async fn call<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let started = Instant::now();
        let call_timeout = self.call_timeout;
        let metrics = &self.metrics;

        let result = retry_on_transient(self.retry.clone(), |attempt| {
            if attempt > 1 {
                metrics.record_retry_attempt(operation);
            }
            let attempt_future = op();
            async move {
                match tokio::time::timeout(call_timeout, attempt_future).await {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::Timeout {
                        operation,
                        after: call_timeout,
                    }),
                }
            }
        })
        .await
        .into_result();

        self.metrics
            .observe_store_call(operation, started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            tracing::error!(operation, error = %e, "Store call failed");
        }
        result
    }
}
