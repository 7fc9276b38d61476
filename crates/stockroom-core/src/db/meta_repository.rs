//! Metadata repository implementation

use crate::error::Result;
use libsql::Connection;

/// Trait for scalar metadata storage operations (async)
#[allow(async_fn_in_trait)]
pub trait MetaRepository {
    /// Read a metadata value
    async fn get_meta(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a metadata value
    async fn set_meta(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a metadata value
    async fn delete_meta(&self, key: &str) -> Result<()>;
}

/// libSQL implementation of `MetaRepository`
pub struct LibSqlMetaRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlMetaRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl MetaRepository for LibSqlMetaRepository<'_> {
    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM meta WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn delete_meta(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM meta WHERE key = ?", [key])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_key_is_none() {
        let db = setup().await;
        let repo = LibSqlMetaRepository::new(db.connection());

        assert_eq!(repo.get_meta("last_sync").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_replace_and_delete() {
        let db = setup().await;
        let repo = LibSqlMetaRepository::new(db.connection());

        repo.set_meta("last_sync", "2024-01-01T00:00:00Z")
            .await
            .unwrap();
        repo.set_meta("last_sync", "2024-02-01T00:00:00Z")
            .await
            .unwrap();
        assert_eq!(
            repo.get_meta("last_sync").await.unwrap().as_deref(),
            Some("2024-02-01T00:00:00Z")
        );

        repo.delete_meta("last_sync").await.unwrap();
        assert_eq!(repo.get_meta("last_sync").await.unwrap(), None);
    }
}
