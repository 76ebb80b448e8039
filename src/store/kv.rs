use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::utils::IsTransient;

// ============================================================================
// Key-Value Store Port
// ============================================================================
//
// The store-native view of a record: a flat map of named attributes, keyed
// by a single string attribute. Adapters (ScyllaDB, in-memory) implement
// this trait; the gateway never sees anything store-specific.
//
// ============================================================================

pub type AttributeMap = HashMap<String, AttributeValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    S(String),
    Null,
}

impl AttributeValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            AttributeValue::Null => None,
        }
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::S(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::S(value.to_string())
    }
}

/// Table identity and layout, handed to the store on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    /// Name of the partition key attribute
    pub key: String,
    /// Every attribute the table carries, key included
    pub attributes: Vec<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, key: impl Into<String>, attributes: Vec<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            attributes,
        }
    }

    pub fn key_of<'a>(&self, item: &'a AttributeMap) -> Option<&'a str> {
        item.get(&self.key).and_then(AttributeValue::as_s)
    }
}

/// One page of a full-table scan. `last_evaluated_key` is the cursor for the
/// next page and is `None` once the scan is exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub items: Vec<AttributeMap>,
    pub last_evaluated_key: Option<String>,
}

/// A single mutation inside a transactional write.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Put { table: TableDef, item: AttributeMap },
    Delete { table: TableDef, key: String },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Store {operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("Store {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Store {operation} returned an unexpected result: {message}")]
    Schema {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn backend(operation: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Backend {
            operation,
            message: err.to_string(),
        }
    }

    pub fn schema(operation: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Schema {
            operation,
            message: err.to_string(),
        }
    }
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Backend { .. } | StoreError::Timeout { .. } => true,
            StoreError::Schema { .. } => false,
        }
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read up to `limit` items following `exclusive_start_key`.
    async fn scan_page(
        &self,
        table: &TableDef,
        exclusive_start_key: Option<&str>,
        limit: usize,
    ) -> Result<ScanPage, StoreError>;

    async fn get_item(&self, table: &TableDef, key: &str) -> Result<Option<AttributeMap>, StoreError>;

    /// Unconditional overwrite keyed by the table's key attribute.
    async fn put_item(&self, table: &TableDef, item: &AttributeMap) -> Result<(), StoreError>;

    /// Unconditional removal; an absent key is not an error.
    async fn delete_item(&self, table: &TableDef, key: &str) -> Result<(), StoreError>;

    /// Apply every op or none of them.
    async fn transact_write(&self, ops: &[WriteOp]) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::backend("get_item", "connection reset").is_transient());
        assert!(StoreError::Timeout {
            operation: "get_item",
            after: Duration::from_millis(10)
        }
        .is_transient());
        assert!(!StoreError::schema("get_item", "column is not text").is_transient());
    }

    #[test]
    fn test_key_of() {
        let table = TableDef::new("Customer", "Id", vec!["Id".to_string(), "Name".to_string()]);
        let mut item = AttributeMap::new();
        assert_eq!(table.key_of(&item), None);

        item.insert("Id".to_string(), AttributeValue::Null);
        assert_eq!(table.key_of(&item), None);

        item.insert("Id".to_string(), "c-1".into());
        assert_eq!(table.key_of(&item), Some("c-1"));
    }
}
