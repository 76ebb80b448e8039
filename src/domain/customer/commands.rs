use serde::{Deserialize, Serialize};

// ============================================================================
// Change Commands - notification payload for downstream consumers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Add,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Add => "ADD",
            ChangeType::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{"type":"ADD","id":"..."}`. Built fresh per mutation, never stored by the
/// service itself (outbox records carry a serialized copy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCommand {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub id: String,
}

impl ChangeCommand {
    pub fn add(id: impl Into<String>) -> Self {
        Self {
            change_type: ChangeType::Add,
            id: id.into(),
        }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            change_type: ChangeType::Delete,
            id: id.into(),
        }
    }

    /// Compact JSON form submitted to the bus.
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_payload(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_has_exactly_type_and_id() {
        let payload = ChangeCommand::add("c-1").to_payload().unwrap();
        assert_eq!(payload, r#"{"type":"ADD","id":"c-1"}"#);

        let value: serde_json::Value = serde_json::from_str(&ChangeCommand::delete("c-2").to_payload().unwrap()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["type"], "DELETE");
        assert_eq!(object["id"], "c-2");
    }

    #[test]
    fn test_payload_parses_back() {
        let command = ChangeCommand::from_payload(r#"{"type":"DELETE","id":"c-9"}"#).unwrap();
        assert_eq!(command, ChangeCommand::delete("c-9"));
        assert!(ChangeCommand::from_payload(r#"{"type":"UPDATE","id":"c-9"}"#).is_err());
    }
}
