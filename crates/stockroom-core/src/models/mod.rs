//! Data models for Stockroom

mod change_event;
mod entity;
mod record;

pub use change_event::{ChangeEvent, EntityType, Operation, OutboxCounts, OutboxStatus};
pub use entity::{
    CustomerDraft, ExpenseDraft, PaymentType, ProductDraft, SaleDraft, SaleItemDraft,
};
pub use record::{Collection, Record};
