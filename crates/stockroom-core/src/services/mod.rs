//! Shared service layer used by the sync engine and clients.

mod store;

pub use store::{EventTransition, LocalStore, META_ACCESS_TOKEN, META_DEVICE_ID, META_LAST_SYNC};
