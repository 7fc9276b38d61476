//! Outbox change event model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;
use crate::util::iso_timestamp_now;

use super::{Collection, Record};

/// Entity kind as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Product,
    Sale,
    Expense,
    Customer,
}

impl EntityType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Sale => "sale",
            Self::Expense => "expense",
            Self::Customer => "customer",
        }
    }

    pub const fn collection(self) -> Collection {
        match self {
            Self::Product => Collection::Products,
            Self::Sale => Collection::Sales,
            Self::Expense => Collection::Expenses,
            Self::Customer => Collection::Customers,
        }
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(Self::Product),
            "sale" => Ok(Self::Sale),
            "expense" => Ok(Self::Expense),
            "customer" => Ok(Self::Customer),
            other => Err(Error::Database(format!("unknown entity type '{other}'"))),
        }
    }
}

/// Kind of local mutation an event replicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(Error::Database(format!("unknown operation '{other}'"))),
        }
    }
}

/// Lifecycle status of an outbox event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub const ALL: [Self; 3] = [Self::Pending, Self::Sent, Self::Failed];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the event should be offered to the next push.
    pub const fn is_pushable(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("unknown outbox status '{other}'"))),
        }
    }
}

/// One local mutation waiting to be replicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Idempotency key
    pub event_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: Operation,
    /// Entity snapshot at the time of the mutation
    pub payload_json: Value,
    pub device_id: String,
    pub created_at: String,
    pub status: OutboxStatus,
    pub retry_count: u32,
}

impl ChangeEvent {
    /// Build a fresh `PENDING` event for a mutated record.
    #[must_use]
    pub fn for_record(
        collection: Collection,
        operation: Operation,
        record: &Record,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7().to_string(),
            entity_type: collection.entity_type(),
            entity_id: record.id.clone(),
            operation,
            payload_json: record.to_json(),
            device_id: device_id.into(),
            created_at: iso_timestamp_now(),
            status: OutboxStatus::Pending,
            retry_count: 0,
        }
    }
}

/// Number of outbox events per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboxCounts {
    pub pending: usize,
    pub sent: usize,
    pub failed: usize,
}

impl OutboxCounts {
    pub(crate) fn add(&mut self, status: OutboxStatus, count: usize) {
        match status {
            OutboxStatus::Pending => self.pending += count,
            OutboxStatus::Sent => self.sent += count,
            OutboxStatus::Failed => self.failed += count,
        }
    }

    pub const fn total(&self) -> usize {
        self.pending + self.sent + self.failed
    }
}
