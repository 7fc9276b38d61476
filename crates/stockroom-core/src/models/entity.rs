//! Typed drafts for building new business entities.
//!
//! Drafts only describe what a client can enter; once converted into a
//! [`Record`](super::Record) the entity is an open attribute map so that
//! server-side additions survive a pull.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::iso_timestamp_now;

/// Attributes of a product entered at the till.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub buy_price: f64,
    #[serde(default)]
    pub sell_price: f64,
    #[serde(default)]
    pub stock_qty: i64,
}

/// Attributes of a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDraft {
    pub full_name: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    #[default]
    Cash,
    Card,
}

/// One sold line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleItemDraft {
    /// Product id
    pub product: String,
    pub quantity: u32,
    pub price: f64,
}

/// A sale; sales are append-only on the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaleDraft {
    #[serde(default)]
    pub payment_type: PaymentType,
    #[serde(default)]
    pub seller: String,
    #[serde(default)]
    pub customer: Option<String>,
    pub items: Vec<SaleItemDraft>,
}

/// An expense; expenses are append-only on the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseDraft {
    #[serde(default)]
    pub category: String,
    pub amount: f64,
    #[serde(default)]
    pub note: String,
}

impl ProductDraft {
    pub fn into_fields(self) -> Result<Map<String, Value>> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("product name is required".into()));
        }
        to_fields(&self)
    }
}

impl CustomerDraft {
    pub fn into_fields(self) -> Result<Map<String, Value>> {
        if self.full_name.trim().is_empty() {
            return Err(Error::InvalidInput("customer name is required".into()));
        }
        to_fields(&self)
    }
}

impl SaleDraft {
    /// Sum of `quantity * price` over all lines.
    pub fn total(&self) -> f64 {
        self.items
            .iter()
            .map(|item| f64::from(item.quantity) * item.price)
            .sum()
    }

    pub fn into_fields(self) -> Result<Map<String, Value>> {
        if self.items.is_empty() {
            return Err(Error::InvalidInput("a sale needs at least one item".into()));
        }
        if self.items.iter().any(|item| item.quantity == 0) {
            return Err(Error::InvalidInput("sale item quantity must be positive".into()));
        }

        let total = self.total();
        let items = self
            .items
            .into_iter()
            .map(|item| {
                serde_json::json!({
                    "id": Uuid::now_v7().to_string(),
                    "product": item.product,
                    "quantity": item.quantity,
                    "price": item.price,
                })
            })
            .collect::<Vec<_>>();

        let mut fields = Map::new();
        fields.insert("sale_datetime".into(), Value::String(iso_timestamp_now()));
        fields.insert("total".into(), serde_json::json!(total));
        fields.insert("payment_type".into(), serde_json::to_value(self.payment_type)?);
        fields.insert("seller".into(), Value::String(self.seller));
        if let Some(customer) = self.customer {
            fields.insert("customer".into(), Value::String(customer));
        }
        fields.insert("items".into(), Value::Array(items));
        Ok(fields)
    }
}

impl ExpenseDraft {
    pub fn into_fields(self) -> Result<Map<String, Value>> {
        let mut fields = to_fields(&self)?;
        fields.insert(
            "expense_datetime".into(),
            Value::String(iso_timestamp_now()),
        );
        Ok(fields)
    }
}

fn to_fields<T: Serialize>(draft: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(draft)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(Error::InvalidInput("draft must serialize to an object".into())),
    }
}
