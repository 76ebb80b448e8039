use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

use super::timestamp;

// ============================================================================
// Customer Entity
// ============================================================================

/// The managed entity. Identity is the `id` alone: two values with the same
/// id are the same customer whatever their other fields say.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub account_number: String,
    #[serde(with = "timestamp::serde_format")]
    pub reg_date: DateTime<Utc>,
}

impl Customer {
    /// Stamp a fresh id and registration time onto the create input.
    pub fn register(input: NewCustomer) -> Self {
        Self {
            id: new_customer_id(),
            name: input.name,
            email: input.email,
            account_number: input.account_number,
            reg_date: timestamp::now(),
        }
    }

    /// Field-for-field comparison, unlike `==` which only looks at the id.
    pub fn same_fields(&self, other: &Customer) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.email == other.email
            && self.account_number == other.account_number
            && self.reg_date == other.reg_date
    }
}

impl PartialEq for Customer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Customer {}

impl Hash for Customer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Create input. Any `id` or `regDate` a client sends is dropped on
/// deserialization; both are assigned server-side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub account_number: String,
}

impl NewCustomer {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        account_number: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            account_number: account_number.into(),
        }
    }
}

/// Random v4 UUID: 122 random bits, collisions are not a practical concern.
pub fn new_customer_id() -> String {
    Uuid::new_v4().to_string()
}
