//! Database layer for Stockroom

mod cache_repository;
mod connection;
mod meta_repository;
mod migrations;
mod outbox_repository;
mod repository;

pub use cache_repository::{CachedResponse, LibSqlResponseCache, ResponseCacheRepository};
pub use connection::Database;
pub use meta_repository::{LibSqlMetaRepository, MetaRepository};
pub use outbox_repository::{LibSqlOutboxRepository, OutboxRepository};
pub use repository::{EntityRepository, LibSqlEntityRepository};

pub(crate) use outbox_repository::update_status as update_event_status;

use crate::error::Result;
use libsql::Connection;

/// Open a write transaction on the shared connection.
pub(crate) async fn begin(conn: &Connection) -> Result<()> {
    conn.execute("BEGIN IMMEDIATE TRANSACTION", ()).await?;
    Ok(())
}

/// Commit when `result` is `Ok`, roll back otherwise.
pub(crate) async fn finish<T>(conn: &Connection, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            if let Err(e) = conn.execute("COMMIT", ()).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
            Ok(value)
        }
        Err(error) => {
            conn.execute("ROLLBACK", ()).await.ok();
            Err(error)
        }
    }
}
