use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::statement::batch::Batch;
use scylla::value::{CqlValue, Row};
use std::sync::Arc;

use super::kv::{AttributeMap, AttributeValue, KeyValueStore, ScanPage, StoreError, TableDef, WriteOp};

// ============================================================================
// ScyllaDB Key-Value Store
// ============================================================================
//
// One CQL table per logical table, one `text` column per attribute, the key
// attribute as the partition key. Identifiers are quoted so attribute names
// keep their case ("Id", "AccountNumber", ...).
//
// Full scans walk the token ring: the first page is a plain SELECT with a
// LIMIT, every following page restarts after token(last key). The last key
// of a full page is the cursor handed back to the caller.
//
// Transactional writes go out as a single logged BATCH.
//
// ============================================================================

pub struct ScyllaStore {
    session: Arc<Session>,
}

impl ScyllaStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Create the table for `table` if it does not exist yet.
    pub async fn ensure_table(&self, table: &TableDef) -> anyhow::Result<()> {
        let columns = table
            .attributes
            .iter()
            .map(|attribute| format!("{} text", quoted(attribute)))
            .collect::<Vec<_>>()
            .join(", ");

        let statement = format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}))",
            quoted(&table.name),
            columns,
            quoted(&table.key)
        );

        self.session.query_unpaged(statement, &[]).await?;

        tracing::info!(table = %table.name, key = %table.key, "Ensured table exists");
        Ok(())
    }

    fn row_to_item(operation: &'static str, table: &TableDef, row: Row) -> Result<AttributeMap, StoreError> {
        let mut item = AttributeMap::new();

        for (attribute, value) in table.attributes.iter().zip(row.columns) {
            match value {
                None => {}
                Some(CqlValue::Text(text)) | Some(CqlValue::Ascii(text)) => {
                    item.insert(attribute.clone(), AttributeValue::S(text));
                }
                Some(other) => {
                    return Err(StoreError::schema(
                        operation,
                        format!("column {attribute} holds a non-text value: {other:?}"),
                    ));
                }
            }
        }

        Ok(item)
    }

    fn insert_statement(table: &TableDef) -> String {
        let columns = table.attributes.iter().map(|a| quoted(a)).collect::<Vec<_>>().join(", ");
        let markers = vec!["?"; table.attributes.len()].join(", ");
        format!("INSERT INTO {} ({}) VALUES ({})", quoted(&table.name), columns, markers)
    }

    fn insert_values(table: &TableDef, item: &AttributeMap) -> Vec<Option<String>> {
        table
            .attributes
            .iter()
            .map(|attribute| {
                item.get(attribute)
                    .and_then(AttributeValue::as_s)
                    .map(str::to_string)
            })
            .collect()
    }

    fn delete_statement(table: &TableDef) -> String {
        format!("DELETE FROM {} WHERE {} = ?", quoted(&table.name), quoted(&table.key))
    }
}

fn quoted(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn select_columns(table: &TableDef) -> String {
    table.attributes.iter().map(|a| quoted(a)).collect::<Vec<_>>().join(", ")
}

#[async_trait]
impl KeyValueStore for ScyllaStore {
    async fn scan_page(
        &self,
        table: &TableDef,
        exclusive_start_key: Option<&str>,
        limit: usize,
    ) -> Result<ScanPage, StoreError> {
        const OP: &str = "scan";
        let limit = i32::try_from(limit.max(1)).unwrap_or(i32::MAX);
        let columns = select_columns(table);

        let result = match exclusive_start_key {
            None => {
                let statement = format!("SELECT {} FROM {} LIMIT ?", columns, quoted(&table.name));
                self.session.query_unpaged(statement, (limit,)).await
            }
            Some(start) => {
                let statement = format!(
                    "SELECT {} FROM {} WHERE token({key}) > token(?) LIMIT ?",
                    columns,
                    quoted(&table.name),
                    key = quoted(&table.key)
                );
                self.session.query_unpaged(statement, (start, limit)).await
            }
        }
        .map_err(|e| StoreError::backend(OP, e))?;

        let rows_result = result.into_rows_result().map_err(|e| StoreError::schema(OP, e))?;
        let mut items = Vec::new();
        for row in rows_result.rows::<Row>().map_err(|e| StoreError::schema(OP, e))? {
            let row = row.map_err(|e| StoreError::schema(OP, e))?;
            items.push(Self::row_to_item(OP, table, row)?);
        }

        // A short page means the ring is exhausted.
        let last_evaluated_key = if items.len() as i32 >= limit {
            items.last().and_then(|item| table.key_of(item)).map(str::to_string)
        } else {
            None
        };

        tracing::debug!(
            table = %table.name,
            item_count = items.len(),
            has_more = last_evaluated_key.is_some(),
            "Scanned page"
        );

        Ok(ScanPage {
            items,
            last_evaluated_key,
        })
    }

    async fn get_item(&self, table: &TableDef, key: &str) -> Result<Option<AttributeMap>, StoreError> {
        const OP: &str = "get_item";
        let statement = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            select_columns(table),
            quoted(&table.name),
            quoted(&table.key)
        );

        let result = self
            .session
            .query_unpaged(statement, (key,))
            .await
            .map_err(|e| StoreError::backend(OP, e))?;

        let rows_result = result.into_rows_result().map_err(|e| StoreError::schema(OP, e))?;
        match rows_result.maybe_first_row::<Row>().map_err(|e| StoreError::schema(OP, e))? {
            Some(row) => Ok(Some(Self::row_to_item(OP, table, row)?)),
            None => Ok(None),
        }
    }

    async fn put_item(&self, table: &TableDef, item: &AttributeMap) -> Result<(), StoreError> {
        if table.key_of(item).is_none() {
            return Err(StoreError::schema("put_item", format!("item has no {} key attribute", table.key)));
        }

        self.session
            .query_unpaged(Self::insert_statement(table), Self::insert_values(table, item))
            .await
            .map_err(|e| StoreError::backend("put_item", e))?;

        Ok(())
    }

    async fn delete_item(&self, table: &TableDef, key: &str) -> Result<(), StoreError> {
        self.session
            .query_unpaged(Self::delete_statement(table), (key,))
            .await
            .map_err(|e| StoreError::backend("delete_item", e))?;

        Ok(())
    }

    async fn transact_write(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
        let mut batch = Batch::default();
        let mut values: Vec<Vec<Option<String>>> = Vec::with_capacity(ops.len());

        for op in ops {
            match op {
                WriteOp::Put { table, item } => {
                    if table.key_of(item).is_none() {
                        return Err(StoreError::schema(
                            "transact_write",
                            format!("item has no {} key attribute", table.key),
                        ));
                    }
                    batch.append_statement(Self::insert_statement(table).as_str());
                    values.push(Self::insert_values(table, item));
                }
                WriteOp::Delete { table, key } => {
                    batch.append_statement(Self::delete_statement(table).as_str());
                    values.push(vec![Some(key.clone())]);
                }
            }
        }

        self.session
            .batch(&batch, values)
            .await
            .map_err(|e| StoreError::backend("transact_write", e))?;

        tracing::debug!(op_count = ops.len(), "Applied logged batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableDef {
        TableDef::new(
            "Customer",
            "Id",
            vec!["Id".to_string(), "Name".to_string(), "RegistrationDate".to_string()],
        )
    }

    #[test]
    fn test_statements_quote_identifiers() {
        assert_eq!(
            ScyllaStore::insert_statement(&table()),
            r#"INSERT INTO "Customer" ("Id", "Name", "RegistrationDate") VALUES (?, ?, ?)"#
        );
        assert_eq!(
            ScyllaStore::delete_statement(&table()),
            r#"DELETE FROM "Customer" WHERE "Id" = ?"#
        );
        assert_eq!(quoted(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn test_insert_values_follow_attribute_order() {
        let item = AttributeMap::from([
            ("Name".to_string(), AttributeValue::from("Ann")),
            ("Id".to_string(), AttributeValue::from("c-1")),
        ]);

        assert_eq!(
            ScyllaStore::insert_values(&table(), &item),
            vec![Some("c-1".to_string()), Some("Ann".to_string()), None]
        );
    }

    #[test]
    fn test_row_to_item_skips_nulls() {
        let row = Row {
            columns: vec![
                Some(CqlValue::Text("c-1".to_string())),
                None,
                Some(CqlValue::Text("2024-05-01T09:30:15.250Z".to_string())),
            ],
        };

        let item = ScyllaStore::row_to_item("get_item", &table(), row).unwrap();
        assert_eq!(item.len(), 2);
        assert_eq!(item["Id"], AttributeValue::from("c-1"));
        assert!(!item.contains_key("Name"));
    }

    #[test]
    fn test_row_to_item_rejects_non_text() {
        let row = Row {
            columns: vec![Some(CqlValue::Int(7)), None, None],
        };

        let err = ScyllaStore::row_to_item("get_item", &table(), row).unwrap_err();
        assert!(matches!(err, StoreError::Schema { .. }));
    }
}
