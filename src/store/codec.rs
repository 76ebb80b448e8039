use crate::domain::customer::timestamp::{self, YearOutOfRange};
use crate::domain::customer::Customer;

use super::kv::{AttributeMap, AttributeValue, TableDef};

// ============================================================================
// Customer Entity Codec
// ============================================================================
//
// Customer <-> attribute map, one string attribute per field. Decoding is
// all-or-nothing: a missing attribute or an unparseable registration date
// fails the whole item. Encoding refuses registration dates whose year the
// timestamp pattern cannot hold.
//
// ============================================================================

/// Attribute names used in the customer table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeNames {
    pub id: String,
    pub name: String,
    pub email: String,
    pub account_number: String,
    pub registration_date: String,
}

impl Default for AttributeNames {
    fn default() -> Self {
        Self {
            id: "Id".to_string(),
            name: "Name".to_string(),
            email: "Email".to_string(),
            account_number: "AccountNumber".to_string(),
            registration_date: "RegistrationDate".to_string(),
        }
    }
}

impl AttributeNames {
    pub fn all(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.email.clone(),
            self.account_number.clone(),
            self.registration_date.clone(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    MissingField,
    MalformedTimestamp,
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeErrorKind::MissingField => f.write_str("missing field"),
            DecodeErrorKind::MalformedTimestamp => f.write_str("malformed timestamp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Cannot decode stored customer {}: {kind} in attribute {attribute}",
    .id.as_deref().unwrap_or("<no id>")
)]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub attribute: String,
    /// Id of the offending item, when it has one
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CustomerCodec {
    names: AttributeNames,
}

impl CustomerCodec {
    pub fn new(names: AttributeNames) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &AttributeNames {
        &self.names
    }

    pub fn table(&self, table_name: &str) -> TableDef {
        TableDef::new(table_name, self.names.id.clone(), self.names.all())
    }

    pub fn encode(&self, customer: &Customer) -> Result<AttributeMap, YearOutOfRange> {
        let n = &self.names;
        let reg_date = timestamp::try_format(&customer.reg_date)?;
        Ok(AttributeMap::from([
            (n.id.clone(), AttributeValue::from(customer.id.as_str())),
            (n.name.clone(), AttributeValue::from(customer.name.as_str())),
            (n.email.clone(), AttributeValue::from(customer.email.as_str())),
            (n.account_number.clone(), AttributeValue::from(customer.account_number.as_str())),
            (n.registration_date.clone(), AttributeValue::S(reg_date)),
        ]))
    }

    pub fn decode(&self, item: &AttributeMap) -> Result<Customer, DecodeError> {
        let n = &self.names;
        let id_hint = string_attr(item, &n.id).map(str::to_string);

        let require = |attribute: &str| -> Result<String, DecodeError> {
            string_attr(item, attribute)
                .map(str::to_string)
                .ok_or_else(|| DecodeError {
                    kind: DecodeErrorKind::MissingField,
                    attribute: attribute.to_string(),
                    id: id_hint.clone(),
                })
        };

        let id = require(&n.id)?;
        if id.is_empty() {
            return Err(DecodeError {
                kind: DecodeErrorKind::MissingField,
                attribute: n.id.clone(),
                id: None,
            });
        }
        let name = require(&n.name)?;
        let email = require(&n.email)?;
        let account_number = require(&n.account_number)?;
        let raw_reg_date = require(&n.registration_date)?;

        let reg_date = timestamp::parse(&raw_reg_date).map_err(|_| DecodeError {
            kind: DecodeErrorKind::MalformedTimestamp,
            attribute: n.registration_date.clone(),
            id: Some(id.clone()),
        })?;

        Ok(Customer {
            id,
            name,
            email,
            account_number,
            reg_date,
        })
    }
}

fn string_attr<'a>(item: &'a AttributeMap, attribute: &str) -> Option<&'a str> {
    item.get(attribute).and_then(AttributeValue::as_s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::NewCustomer;
    use chrono::DateTime;
    use proptest::prelude::*;

    fn sample() -> Customer {
        Customer::register(NewCustomer::new("Ann", "a@x.com", "AC1"))
    }

    #[test]
    fn test_encode_writes_one_string_attribute_per_field() {
        let codec = CustomerCodec::default();
        let mut customer = sample();
        customer.reg_date = timestamp::parse("2024-05-01T09:30:15.250Z").unwrap();

        let item = codec.encode(&customer).unwrap();

        assert_eq!(item.len(), 5);
        assert_eq!(item["Id"], AttributeValue::S(customer.id.clone()));
        assert_eq!(item["Name"], AttributeValue::from("Ann"));
        assert_eq!(item["Email"], AttributeValue::from("a@x.com"));
        assert_eq!(item["AccountNumber"], AttributeValue::from("AC1"));
        assert_eq!(item["RegistrationDate"], AttributeValue::from("2024-05-01T09:30:15.250Z"));
    }

    /// Last millisecond of year 9999.
    const MAX_MILLIS: i64 = 253_402_300_799_999;
    /// First millisecond of year 0000.
    const MIN_MILLIS: i64 = -62_167_219_200_000;

    proptest! {
        #[test]
        fn prop_round_trip_preserves_every_field(
            id in "\\PC{1,40}",
            name in any::<String>(),
            email in any::<String>(),
            account_number in any::<String>(),
            millis in MIN_MILLIS..=MAX_MILLIS,
        ) {
            let codec = CustomerCodec::default();
            let customer = Customer {
                id,
                name,
                email,
                account_number,
                reg_date: DateTime::from_timestamp_millis(millis).unwrap(),
            };

            let decoded = codec.decode(&codec.encode(&customer).unwrap()).unwrap();

            prop_assert!(decoded.same_fields(&customer), "{decoded:?} != {customer:?}");
        }
    }

    #[test]
    fn test_encode_rejects_unrepresentable_year() {
        let codec = CustomerCodec::default();
        let mut customer = sample();
        customer.reg_date = DateTime::from_timestamp_millis(MAX_MILLIS + 1).unwrap();

        assert_eq!(codec.encode(&customer), Err(YearOutOfRange(10000)));
    }

    #[test]
    fn test_round_trip_truncates_sub_millisecond_precision() {
        let codec = CustomerCodec::default();
        let mut customer = sample();
        customer.reg_date = customer.reg_date + chrono::Duration::microseconds(123);

        let decoded = codec.decode(&codec.encode(&customer).unwrap()).unwrap();

        assert_eq!(
            decoded.reg_date.timestamp_millis(),
            customer.reg_date.timestamp_millis()
        );
        assert_eq!(decoded.reg_date.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_decode_missing_field_for_each_attribute() {
        let codec = CustomerCodec::default();
        let customer = sample();

        for attribute in codec.names().all() {
            let mut item = codec.encode(&customer).unwrap();
            item.remove(&attribute);

            let err = codec.decode(&item).unwrap_err();
            assert_eq!(err.kind, DecodeErrorKind::MissingField);
            assert_eq!(err.attribute, attribute);
        }
    }

    #[test]
    fn test_decode_null_attribute_is_missing() {
        let codec = CustomerCodec::default();
        let customer = sample();
        let mut item = codec.encode(&customer).unwrap();
        item.insert("Email".to_string(), AttributeValue::Null);

        let err = codec.decode(&item).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::MissingField);
        assert_eq!(err.id.as_deref(), Some(customer.id.as_str()));
    }

    #[test]
    fn test_decode_empty_id_is_missing() {
        let codec = CustomerCodec::default();
        let mut item = codec.encode(&sample()).unwrap();
        item.insert("Id".to_string(), "".into());

        let err = codec.decode(&item).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::MissingField);
        assert_eq!(err.attribute, "Id");
    }

    #[test]
    fn test_decode_malformed_timestamp() {
        let codec = CustomerCodec::default();
        let customer = sample();
        let mut item = codec.encode(&customer).unwrap();
        item.insert("RegistrationDate".to_string(), "2024-05-01 09:30".into());

        let err = codec.decode(&item).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::MalformedTimestamp);
        assert_eq!(err.attribute, "RegistrationDate");
        assert!(err.to_string().contains(&customer.id));
    }

    #[test]
    fn test_custom_attribute_names() {
        let codec = CustomerCodec::new(AttributeNames {
            id: "customer_id".to_string(),
            name: "full_name".to_string(),
            email: "email_address".to_string(),
            account_number: "account".to_string(),
            registration_date: "registered_at".to_string(),
        });
        let customer = sample();

        let item = codec.encode(&customer).unwrap();
        assert!(item.contains_key("customer_id"));
        assert!(item.contains_key("registered_at"));
        assert!(codec.decode(&item).unwrap().same_fields(&customer));

        let table = codec.table("customers");
        assert_eq!(table.key, "customer_id");
        assert_eq!(table.attributes.len(), 5);
    }
}
