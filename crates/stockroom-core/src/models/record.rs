//! Entity record model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Error;
use crate::util::iso_timestamp_now;

use super::EntityType;

/// Local collections holding business entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Products,
    Sales,
    Expenses,
    Customers,
}

impl Collection {
    /// Every entity collection, in the order pulls are applied.
    pub const ALL: [Self; 4] = [Self::Products, Self::Customers, Self::Sales, Self::Expenses];

    /// Table and wire name of the collection.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Sales => "sales",
            Self::Expenses => "expenses",
            Self::Customers => "customers",
        }
    }

    /// Entity type carried by change events for this collection.
    pub const fn entity_type(self) -> EntityType {
        match self {
            Self::Products => EntityType::Product,
            Self::Sales => EntityType::Sale,
            Self::Expenses => EntityType::Expense,
            Self::Customers => EntityType::Customer,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "products" | "product" => Ok(Self::Products),
            "sales" | "sale" => Ok(Self::Sales),
            "expenses" | "expense" => Ok(Self::Expenses),
            "customers" | "customer" => Ok(Self::Customers),
            other => Err(Error::InvalidInput(format!("unknown collection '{other}'"))),
        }
    }
}

const fn default_version() -> i64 {
    1
}

/// A business entity snapshot.
///
/// Only `id`, `version` and `updated_at` are interpreted locally. Every other
/// attribute is kept verbatim in `fields` so that a pulled server snapshot can
/// replace the local copy without losing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Client-generated identifier, stable across sync
    pub id: String,
    /// Incremented on every local mutation
    #[serde(default = "default_version")]
    pub version: i64,
    /// Last mutation time (ISO-8601); empty when the server sent none
    #[serde(default, deserialize_with = "null_as_empty")]
    pub updated_at: String,
    /// Remaining entity attributes
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a brand new record with a fresh id at version 1.
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            version: 1,
            updated_at: iso_timestamp_now(),
            fields: without_reserved_keys(fields),
        }
    }

    /// Look up an attribute by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Merge attribute changes into this record.
    ///
    /// Reserved keys (`id`, `version`, `updated_at`) are ignored; they only
    /// move through [`Record::touch`].
    pub fn apply_changes(&mut self, changes: Map<String, Value>) {
        for (key, value) in without_reserved_keys(changes) {
            self.fields.insert(key, value);
        }
    }

    /// Bump the version and refresh `updated_at` for a local mutation.
    pub fn touch(&mut self) {
        self.version = self.version.saturating_add(1);
        self.updated_at = iso_timestamp_now();
    }

    /// Full JSON snapshot of the record.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn without_reserved_keys(mut fields: Map<String, Value>) -> Map<String, Value> {
    for key in ["id", "version", "updated_at"] {
        fields.remove(key);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn new_record_starts_at_version_one() {
        let record = Record::new(fields(json!({"name": "Tea", "id": "ignored"})));
        assert_eq!(record.version, 1);
        assert_ne!(record.id, "ignored");
        assert_eq!(record.field("name"), Some(&json!("Tea")));
        assert!(record.field("id").is_none());
    }

    #[test]
    fn touch_bumps_version_and_timestamp() {
        let mut record = Record::new(Map::new());
        record.updated_at = "2020-01-01T00:00:00Z".to_string();
        record.touch();
        assert_eq!(record.version, 2);
        assert!(record.updated_at.as_str() > "2020-01-01T00:00:00Z");
    }

    #[test]
    fn server_snapshot_keeps_unknown_fields() {
        let record: Record = serde_json::from_value(json!({
            "id": "P1",
            "name": "Coffee",
            "needs_review": true,
            "version": 4,
            "updated_at": "2024-05-01T10:00:00+00:00"
        }))
        .unwrap();

        assert_eq!(record.version, 4);
        assert_eq!(record.field("needs_review"), Some(&json!(true)));
        assert_eq!(record.to_json()["name"], json!("Coffee"));
    }

    #[test]
    fn server_snapshot_accepts_null_updated_at() {
        let record: Record = serde_json::from_value(json!({
            "id": "P2",
            "name": "Milk",
            "updated_at": null
        }))
        .unwrap();

        assert_eq!(record.updated_at, "");
        assert_eq!(record.version, 1);
        assert_eq!(record.field("name"), Some(&json!("Milk")));
    }

    #[test]
    fn apply_changes_skips_reserved_keys() {
        let mut record = Record::new(fields(json!({"name": "Tea"})));
        let id = record.id.clone();
        record.apply_changes(fields(json!({"name": "Green tea", "id": "x", "version": 99})));
        assert_eq!(record.id, id);
        assert_eq!(record.version, 1);
        assert_eq!(record.field("name"), Some(&json!("Green tea")));
    }

    #[test]
    fn collection_parses_singular_and_plural() {
        assert_eq!("product".parse::<Collection>().unwrap(), Collection::Products);
        assert_eq!(" Sales ".parse::<Collection>().unwrap(), Collection::Sales);
        assert!("orders".parse::<Collection>().is_err());
    }
}
