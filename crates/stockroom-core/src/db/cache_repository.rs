//! Offline response cache repository

use crate::error::{Error, Result};
use crate::util::iso_timestamp_now;
use libsql::{Connection, Value};

use super::{begin, finish};

/// A stored response body for one request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub path: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Trait for generation-scoped response caching (async)
#[allow(async_fn_in_trait)]
pub trait ResponseCacheRepository {
    /// Look up a cached response in a generation
    async fn lookup(&self, generation: &str, path: &str) -> Result<Option<CachedResponse>>;

    /// Store all responses in a generation atomically
    async fn store_all(&self, generation: &str, responses: &[CachedResponse]) -> Result<()>;

    /// Names of every generation holding at least one entry
    async fn generations(&self) -> Result<Vec<String>>;

    /// Drop every generation except `keep`; returns the dropped names
    async fn retain_only(&self, keep: &str) -> Result<Vec<String>>;
}

/// libSQL implementation of `ResponseCacheRepository`
pub struct LibSqlResponseCache<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlResponseCache<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl ResponseCacheRepository for LibSqlResponseCache<'_> {
    async fn lookup(&self, generation: &str, path: &str) -> Result<Option<CachedResponse>> {
        let mut rows = self
            .conn
            .query(
                "SELECT path, status, content_type, body FROM response_cache
                 WHERE generation = ? AND path = ?",
                [generation, path],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let status: i64 = row.get(1)?;
        Ok(Some(CachedResponse {
            path: row.get(0)?,
            status: u16::try_from(status).unwrap_or(200),
            content_type: match row.get_value(2)? {
                Value::Text(content_type) => Some(content_type),
                _ => None,
            },
            body: row.get::<Vec<u8>>(3)?,
        }))
    }

    async fn store_all(&self, generation: &str, responses: &[CachedResponse]) -> Result<()> {
        begin(self.conn).await?;
        let result = async {
            let stored_at = iso_timestamp_now();
            for response in responses {
                let content_type = response
                    .content_type
                    .clone()
                    .map_or(Value::Null, Value::Text);
                self.conn
                    .execute(
                        "INSERT OR REPLACE INTO response_cache
                            (generation, path, status, content_type, body, stored_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        libsql::params![
                            generation,
                            response.path.as_str(),
                            i64::from(response.status),
                            content_type,
                            response.body.clone(),
                            stored_at.as_str()
                        ],
                    )
                    .await?;
            }
            Ok::<(), Error>(())
        }
        .await;
        finish(self.conn, result).await
    }

    async fn generations(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT DISTINCT generation FROM response_cache ORDER BY generation",
                (),
            )
            .await?;

        let mut names = Vec::new();
        while let Some(row) = rows.next().await? {
            names.push(row.get::<String>(0)?);
        }
        Ok(names)
    }

    async fn retain_only(&self, keep: &str) -> Result<Vec<String>> {
        let stale = self
            .generations()
            .await?
            .into_iter()
            .filter(|name| name != keep)
            .collect::<Vec<_>>();

        if !stale.is_empty() {
            self.conn
                .execute("DELETE FROM response_cache WHERE generation != ?", [keep])
                .await?;
        }
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn page(path: &str, body: &str) -> CachedResponse {
        CachedResponse {
            path: path.to_string(),
            status: 200,
            content_type: Some("text/html".to_string()),
            body: body.as_bytes().to_vec(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_store_and_lookup() {
        let db = setup().await;
        let cache = LibSqlResponseCache::new(db.connection());

        cache
            .store_all("v1", &[page("/offline/products/", "<html>")])
            .await
            .unwrap();

        let hit = cache.lookup("v1", "/offline/products/").await.unwrap();
        assert_eq!(hit, Some(page("/offline/products/", "<html>")));
        assert!(cache.lookup("v2", "/offline/products/").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_retain_only_drops_other_generations() {
        let db = setup().await;
        let cache = LibSqlResponseCache::new(db.connection());

        cache.store_all("v1", &[page("/a", "old")]).await.unwrap();
        cache.store_all("v2", &[page("/a", "new")]).await.unwrap();

        let dropped = cache.retain_only("v2").await.unwrap();
        assert_eq!(dropped, vec!["v1".to_string()]);
        assert_eq!(cache.generations().await.unwrap(), vec!["v2".to_string()]);
    }
}
