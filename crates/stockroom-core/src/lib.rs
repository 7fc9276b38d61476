//! stockroom-core - Core library for Stockroom
//!
//! Offline-first replication client for a point-of-sale back office: a local
//! libSQL store, an outbox of pending change events, a push/pull sync engine
//! and an offline request interceptor. Used by the CLI and any other client.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod offline;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{ChangeEvent, Collection, OutboxStatus, Record};
pub use services::LocalStore;
pub use sync::{SyncEngine, SyncFailure, SyncResult};
