//! Entity repository implementation

use crate::error::{Error, Result};
use crate::models::{ChangeEvent, Collection, Record};
use libsql::Connection;

use super::outbox_repository::insert_event;
use super::{begin, finish};

/// Trait for entity storage operations (async)
#[allow(async_fn_in_trait)]
pub trait EntityRepository {
    /// Insert or fully replace a record by id
    async fn put(&self, collection: Collection, record: &Record) -> Result<()>;

    /// Get a record by id
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>>;

    /// List all records of a collection
    async fn list(&self, collection: Collection) -> Result<Vec<Record>>;

    /// Remove a record; returns whether a row existed
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool>;

    /// Write a record and enqueue its change event in one transaction
    async fn put_with_event(
        &self,
        collection: Collection,
        record: &Record,
        event: &ChangeEvent,
    ) -> Result<()>;

    /// Remove a record and enqueue its change event in one transaction
    async fn delete_with_event(
        &self,
        collection: Collection,
        id: &str,
        event: &ChangeEvent,
    ) -> Result<()>;
}

/// libSQL implementation of `EntityRepository`
pub struct LibSqlEntityRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntityRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Upsert without opening a transaction; callers own the transaction
    pub(crate) async fn upsert(&self, collection: Collection, record: &Record) -> Result<()> {
        if record.id.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "{collection} record without id"
            )));
        }

        let payload = serde_json::to_string(record)?;
        let sql = format!(
            "INSERT INTO {} (id, version, updated_at, payload) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                updated_at = excluded.updated_at,
                payload = excluded.payload",
            collection.as_str()
        );
        self.conn
            .execute(
                &sql,
                libsql::params![
                    record.id.as_str(),
                    record.version,
                    record.updated_at.as_str(),
                    payload
                ],
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", collection.as_str());
        let rows = self.conn.execute(&sql, [id]).await?;
        Ok(rows > 0)
    }

    /// Parse a record from a database row
    fn parse_record(row: &libsql::Row) -> Result<Record> {
        let payload: String = row.get(0)?;
        Ok(serde_json::from_str(&payload)?)
    }
}

impl EntityRepository for LibSqlEntityRepository<'_> {
    async fn put(&self, collection: Collection, record: &Record) -> Result<()> {
        self.upsert(collection, record).await
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let sql = format!("SELECT payload FROM {} WHERE id = ?", collection.as_str());
        let mut rows = self.conn.query(&sql, [id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT payload FROM {} ORDER BY updated_at DESC, id ASC",
            collection.as_str()
        );
        let mut rows = self.conn.query(&sql, ()).await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        self.remove(collection, id).await
    }

    async fn put_with_event(
        &self,
        collection: Collection,
        record: &Record,
        event: &ChangeEvent,
    ) -> Result<()> {
        begin(self.conn).await?;
        let result = async {
            self.upsert(collection, record).await?;
            insert_event(self.conn, event).await
        }
        .await;
        finish(self.conn, result).await
    }

    async fn delete_with_event(
        &self,
        collection: Collection,
        id: &str,
        event: &ChangeEvent,
    ) -> Result<()> {
        begin(self.conn).await?;
        let result = async {
            if !self.remove(collection, id).await? {
                return Err(Error::NotFound(format!("{collection}/{id}")));
            }
            insert_event(self.conn, event).await
        }
        .await;
        finish(self.conn, result).await
    }
}
