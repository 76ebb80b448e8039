use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::customer::{timestamp, ChangeCommand, ChangeType};
use crate::store::{AttributeMap, AttributeValue, TableDef};

// ============================================================================
// Outbox Record
// ============================================================================
//
// A change command waiting for delivery, written in the same transaction as
// the customer mutation it describes:
//
//   EventId    | CustomerId | Type | Payload                      | CreatedAt
//   uuid v7    | id         | ADD  | {"type":"ADD","id":"..."}    | fixed ts
//
// EventId doubles as the bus entry id, so every redelivery of a record
// carries the same id. It is a UUID v7: ids minted by one process sort in
// creation order even within a single CreatedAt millisecond.
//
// ============================================================================

pub const EVENT_ID: &str = "EventId";
pub const CUSTOMER_ID: &str = "CustomerId";
pub const TYPE: &str = "Type";
pub const PAYLOAD: &str = "Payload";
pub const CREATED_AT: &str = "CreatedAt";

pub fn outbox_table(name: &str) -> TableDef {
    TableDef::new(
        name,
        EVENT_ID,
        [EVENT_ID, CUSTOMER_ID, TYPE, PAYLOAD, CREATED_AT]
            .iter()
            .map(|a| a.to_string())
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRecord {
    pub event_id: String,
    pub command: ChangeCommand,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed outbox record {}: {reason}", .event_id.as_deref().unwrap_or("<no event id>"))]
pub struct MalformedOutboxRecord {
    pub event_id: Option<String>,
    pub reason: String,
}

impl OutboxRecord {
    pub fn new(command: ChangeCommand) -> Self {
        Self {
            event_id: Uuid::now_v7().to_string(),
            command,
            created_at: timestamp::now(),
        }
    }

    pub fn encode(&self) -> Result<AttributeMap, serde_json::Error> {
        let payload = self.command.to_payload()?;
        Ok(AttributeMap::from([
            (EVENT_ID.to_string(), AttributeValue::from(self.event_id.as_str())),
            (CUSTOMER_ID.to_string(), AttributeValue::from(self.command.id.as_str())),
            (TYPE.to_string(), AttributeValue::from(self.command.change_type.as_str())),
            (PAYLOAD.to_string(), AttributeValue::S(payload)),
            (CREATED_AT.to_string(), AttributeValue::S(timestamp::format(&self.created_at))),
        ]))
    }

    /// The payload is authoritative; `CustomerId` and `Type` are kept for
    /// operators reading the table and must agree with it.
    pub fn decode(item: &AttributeMap) -> Result<Self, MalformedOutboxRecord> {
        let event_id = attr(item, EVENT_ID).map(str::to_string);
        let malformed = |reason: String| MalformedOutboxRecord {
            event_id: event_id.clone(),
            reason,
        };
        let require = |attribute: &str| {
            attr(item, attribute).ok_or_else(|| malformed(format!("missing {attribute}")))
        };

        let id = require(EVENT_ID)?.to_string();
        let command = ChangeCommand::from_payload(require(PAYLOAD)?)
            .map_err(|e| malformed(format!("unreadable payload: {e}")))?;
        let created_at =
            timestamp::parse(require(CREATED_AT)?).map_err(|e| malformed(e.to_string()))?;

        if let Some(customer_id) = attr(item, CUSTOMER_ID) {
            if customer_id != command.id {
                return Err(malformed(format!(
                    "{CUSTOMER_ID} {customer_id} disagrees with payload id {}",
                    command.id
                )));
            }
        }
        if let Some(change_type) = attr(item, TYPE) {
            if change_type != command.change_type.as_str() {
                return Err(malformed(format!(
                    "{TYPE} {change_type} disagrees with payload type {}",
                    command.change_type
                )));
            }
        }

        Ok(Self {
            event_id: id,
            command,
            created_at,
        })
    }

    pub fn change_type(&self) -> ChangeType {
        self.command.change_type
    }
}

fn attr<'a>(item: &'a AttributeMap, attribute: &str) -> Option<&'a str> {
    item.get(attribute).and_then(AttributeValue::as_s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let record = OutboxRecord::new(ChangeCommand::add("c-1"));
        let item = record.encode().unwrap();

        assert_eq!(item.len(), 5);
        assert_eq!(item[EVENT_ID], AttributeValue::S(record.event_id.clone()));
        assert_eq!(item[CUSTOMER_ID], AttributeValue::from("c-1"));
        assert_eq!(item[TYPE], AttributeValue::from("ADD"));
        assert_eq!(item[PAYLOAD], AttributeValue::from(r#"{"type":"ADD","id":"c-1"}"#));
        assert_eq!(outbox_table("CustomerOutbox").key_of(&item), Some(record.event_id.as_str()));
    }

    #[test]
    fn test_event_ids_follow_creation_order() {
        let records: Vec<OutboxRecord> = (0..1000)
            .map(|i| OutboxRecord::new(ChangeCommand::add(format!("c-{i}"))))
            .collect();

        for pair in records.windows(2) {
            assert!(
                (&pair[0].created_at, &pair[0].event_id) < (&pair[1].created_at, &pair[1].event_id),
                "{} sorts after {}",
                pair[0].event_id,
                pair[1].event_id
            );
        }
    }

    #[test]
    fn test_decode_restores_record() {
        let record = OutboxRecord::new(ChangeCommand::delete("c-9"));
        let decoded = OutboxRecord::decode(&record.encode().unwrap()).unwrap();

        assert_eq!(decoded, record);
        assert_eq!(decoded.change_type(), ChangeType::Delete);
    }

    #[test]
    fn test_decode_rejects_garbage_payload() {
        let record = OutboxRecord::new(ChangeCommand::add("c-1"));
        let mut item = record.encode().unwrap();
        item.insert(PAYLOAD.to_string(), "not json".into());

        let err = OutboxRecord::decode(&item).unwrap_err();
        assert_eq!(err.event_id.as_deref(), Some(record.event_id.as_str()));
        assert!(err.reason.starts_with("unreadable payload"));
    }

    #[test]
    fn test_decode_rejects_disagreeing_columns() {
        let mut item = OutboxRecord::new(ChangeCommand::add("c-1")).encode().unwrap();
        item.insert(CUSTOMER_ID.to_string(), "c-2".into());

        assert!(OutboxRecord::decode(&item).is_err());
    }

    #[test]
    fn test_decode_requires_created_at() {
        let mut item = OutboxRecord::new(ChangeCommand::add("c-1")).encode().unwrap();
        item.remove(CREATED_AT);

        let err = OutboxRecord::decode(&item).unwrap_err();
        assert_eq!(err.reason, "missing CreatedAt");
    }
}
