use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use super::kv::{AttributeMap, KeyValueStore, ScanPage, StoreError, TableDef, WriteOp};

// ============================================================================
// In-Memory Key-Value Store
// ============================================================================
//
// Process-local store used for local runs (STORE_BACKEND=memory) and tests.
// Behaves like the durable store from the gateway's point of view:
// - items ordered by key, scans paginated at `max_page_size`
// - unconditional put / idempotent delete
// - all-or-nothing transactional writes
//
// Faults and latency can be injected to exercise retry and timeout paths.
//
// ============================================================================

type Table = BTreeMap<String, AttributeMap>;

pub struct InMemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    max_page_size: usize,
    latency: Option<Duration>,
    faults: Mutex<u32>,
    scan_calls: AtomicU64,
    write_calls: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            max_page_size: 100,
            latency: None,
            faults: Mutex::new(0),
            scan_calls: AtomicU64::new(0),
            write_calls: AtomicU64::new(0),
        }
    }

    /// Cap on items per scan page, regardless of the requested limit.
    pub fn with_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    /// Delay applied before every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next `count` calls fail with a backend error.
    pub async fn fail_next(&self, count: u32) {
        *self.faults.lock().await = count;
    }

    pub fn scan_calls(&self) -> u64 {
        self.scan_calls.load(Ordering::SeqCst)
    }

    /// Successful put / delete / transactional write calls.
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub async fn item_count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, BTreeMap::len)
    }

    /// Write an item as-is, bypassing fault injection (for seeding
    /// malformed data).
    pub async fn insert_raw(&self, table: &str, key: &str, item: AttributeMap) {
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), item);
    }

    async fn before_call(&self, operation: &'static str) -> Result<(), StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut faults = self.faults.lock().await;
        if *faults > 0 {
            *faults -= 1;
            tracing::debug!(operation, remaining = *faults, "Injected store failure");
            return Err(StoreError::backend(operation, "injected failure"));
        }
        Ok(())
    }
}

fn required_key<'a>(
    operation: &'static str,
    table: &TableDef,
    item: &'a AttributeMap,
) -> Result<&'a str, StoreError> {
    table.key_of(item).ok_or_else(|| {
        StoreError::schema(operation, format!("item has no {} key attribute", table.key))
    })
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn scan_page(
        &self,
        table: &TableDef,
        exclusive_start_key: Option<&str>,
        limit: usize,
    ) -> Result<ScanPage, StoreError> {
        self.before_call("scan").await?;
        self.scan_calls.fetch_add(1, Ordering::SeqCst);

        let page_size = limit.clamp(1, self.max_page_size);
        let tables = self.tables.read().await;
        let Some(rows) = tables.get(&table.name) else {
            return Ok(ScanPage::default());
        };

        let lower = match exclusive_start_key {
            Some(key) => Bound::Excluded(key.to_string()),
            None => Bound::Unbounded,
        };

        let mut window: Vec<(&String, &AttributeMap)> = rows
            .range((lower, Bound::Unbounded))
            .take(page_size + 1)
            .collect();

        let has_more = window.len() > page_size;
        window.truncate(page_size);

        let last_evaluated_key = if has_more {
            window.last().map(|(key, _)| (*key).clone())
        } else {
            None
        };

        Ok(ScanPage {
            items: window.into_iter().map(|(_, item)| item.clone()).collect(),
            last_evaluated_key,
        })
    }

    async fn get_item(&self, table: &TableDef, key: &str) -> Result<Option<AttributeMap>, StoreError> {
        self.before_call("get_item").await?;

        Ok(self
            .tables
            .read()
            .await
            .get(&table.name)
            .and_then(|rows| rows.get(key))
            .cloned())
    }

    async fn put_item(&self, table: &TableDef, item: &AttributeMap) -> Result<(), StoreError> {
        self.before_call("put_item").await?;
        let key = required_key("put_item", table, item)?;

        self.tables
            .write()
            .await
            .entry(table.name.clone())
            .or_default()
            .insert(key.to_string(), item.clone());
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_item(&self, table: &TableDef, key: &str) -> Result<(), StoreError> {
        self.before_call("delete_item").await?;

        if let Some(rows) = self.tables.write().await.get_mut(&table.name) {
            rows.remove(key);
        }
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn transact_write(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
        self.before_call("transact_write").await?;

        // Validate everything before touching any table.
        for op in ops {
            if let WriteOp::Put { table, item } = op {
                required_key("transact_write", table, item)?;
            }
        }

        let mut tables = self.tables.write().await;
        for op in ops {
            match op {
                WriteOp::Put { table, item } => {
                    let key = required_key("transact_write", table, item)?;
                    tables
                        .entry(table.name.clone())
                        .or_default()
                        .insert(key.to_string(), item.clone());
                }
                WriteOp::Delete { table, key } => {
                    if let Some(rows) = tables.get_mut(&table.name) {
                        rows.remove(key);
                    }
                }
            }
        }
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AttributeValue;

    fn table() -> TableDef {
        TableDef::new("T", "Id", vec!["Id".to_string(), "V".to_string()])
    }

    fn item(id: &str, v: &str) -> AttributeMap {
        AttributeMap::from([
            ("Id".to_string(), AttributeValue::from(id)),
            ("V".to_string(), AttributeValue::from(v)),
        ])
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryStore::new();
        let t = table();

        store.put_item(&t, &item("a", "1")).await.unwrap();
        store.put_item(&t, &item("a", "2")).await.unwrap();
        assert_eq!(store.get_item(&t, "a").await.unwrap(), Some(item("a", "2")));
        assert_eq!(store.item_count("T").await, 1);

        store.delete_item(&t, "a").await.unwrap();
        store.delete_item(&t, "a").await.unwrap();
        assert_eq!(store.get_item(&t, "a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scan_pages_follow_cursor() {
        let store = InMemoryStore::new().with_page_size(2);
        let t = table();
        for id in ["a", "b", "c", "d", "e"] {
            store.put_item(&t, &item(id, "x")).await.unwrap();
        }

        let first = store.scan_page(&t, None, 10).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.last_evaluated_key.as_deref(), Some("b"));

        let second = store.scan_page(&t, Some("b"), 10).await.unwrap();
        assert_eq!(second.last_evaluated_key.as_deref(), Some("d"));

        let last = store.scan_page(&t, Some("d"), 10).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.last_evaluated_key, None);
    }

    #[tokio::test]
    async fn test_put_without_key_is_rejected() {
        let store = InMemoryStore::new();
        let mut no_key = item("a", "1");
        no_key.remove("Id");

        let err = store.put_item(&table(), &no_key).await.unwrap_err();
        assert!(matches!(err, StoreError::Schema { .. }));
    }

    #[tokio::test]
    async fn test_transact_write_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let t = table();
        let mut no_key = item("b", "1");
        no_key.remove("Id");

        let result = store
            .transact_write(&[
                WriteOp::Put { table: t.clone(), item: item("a", "1") },
                WriteOp::Put { table: t.clone(), item: no_key },
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(store.item_count("T").await, 0);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = InMemoryStore::new();
        store.fail_next(2).await;

        assert!(store.get_item(&table(), "a").await.is_err());
        assert!(store.get_item(&table(), "a").await.is_err());
        assert!(store.get_item(&table(), "a").await.is_ok());
    }
}
