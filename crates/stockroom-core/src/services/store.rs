//! Shared local store handle used by the sync engine and clients.

use std::path::PathBuf;
use std::sync::Arc;

use libsql::Connection;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{
    self, CachedResponse, Database, EntityRepository, LibSqlEntityRepository,
    LibSqlMetaRepository, LibSqlOutboxRepository, LibSqlResponseCache, MetaRepository,
    OutboxRepository, ResponseCacheRepository,
};
use crate::error::{Error, Result};
use crate::models::{ChangeEvent, Collection, Operation, OutboxCounts, OutboxStatus, Record};
use crate::util::parse_iso_timestamp;

/// Metadata key of the pull watermark.
pub const META_LAST_SYNC: &str = "last_sync";
/// Metadata key of the per-installation device id.
pub const META_DEVICE_ID: &str = "device_id";
/// Metadata key of the persisted bearer credential.
pub const META_ACCESS_TOKEN: &str = "access_token";

/// New outbox state for one pushed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTransition {
    pub event_id: String,
    pub status: OutboxStatus,
    pub retry_count: u32,
}

/// Thread-safe handle over the local database.
///
/// Every method locks the connection for the duration of one storage
/// operation, so no caller observes a half-written record.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::info!("Local store ready at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location, if the store is file-backed.
    pub fn path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    // ---------------------------------------------------------------------
    // Raw entity access (no outbox side effects)
    // ---------------------------------------------------------------------

    /// Insert or fully replace a record.
    pub async fn put(&self, collection: Collection, record: &Record) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection())
            .put(collection, record)
            .await
    }

    /// Fetch a record by id.
    pub async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection())
            .get(collection, id)
            .await
    }

    /// List every record of a collection.
    pub async fn list(&self, collection: Collection) -> Result<Vec<Record>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection())
            .list(collection)
            .await
    }

    /// Remove a record; returns whether it existed.
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection())
            .delete(collection, id)
            .await
    }

    // ---------------------------------------------------------------------
    // Mutations (entity write + outbox enqueue in one transaction)
    // ---------------------------------------------------------------------

    /// Create a new entity and enqueue its `CREATE` event.
    pub async fn create(
        &self,
        collection: Collection,
        fields: Map<String, Value>,
    ) -> Result<Record> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let device_id = ensure_device_id(conn).await?;

        let record = Record::new(fields);
        let event = ChangeEvent::for_record(collection, Operation::Create, &record, device_id);
        LibSqlEntityRepository::new(conn)
            .put_with_event(collection, &record, &event)
            .await?;

        tracing::debug!("Created {} {} (event {})", collection, record.id, event.event_id);
        Ok(record)
    }

    /// Apply attribute changes to an entity, bump its version and enqueue `UPDATE`.
    pub async fn update(
        &self,
        collection: Collection,
        id: &str,
        changes: Map<String, Value>,
    ) -> Result<Record> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let repo = LibSqlEntityRepository::new(conn);

        let mut record = repo
            .get(collection, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{collection}/{id}")))?;
        record.apply_changes(changes);
        record.touch();

        let device_id = ensure_device_id(conn).await?;
        let event = ChangeEvent::for_record(collection, Operation::Update, &record, device_id);
        repo.put_with_event(collection, &record, &event).await?;

        tracing::debug!(
            "Updated {} {} to version {} (event {})",
            collection,
            record.id,
            record.version,
            event.event_id
        );
        Ok(record)
    }

    /// Delete an entity locally and enqueue a `DELETE` event carrying its last snapshot.
    pub async fn remove(&self, collection: Collection, id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let repo = LibSqlEntityRepository::new(conn);

        let mut record = repo
            .get(collection, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{collection}/{id}")))?;
        record.touch();

        let device_id = ensure_device_id(conn).await?;
        let event = ChangeEvent::for_record(collection, Operation::Delete, &record, device_id);
        repo.delete_with_event(collection, id, &event).await
    }

    // ---------------------------------------------------------------------
    // Outbox
    // ---------------------------------------------------------------------

    /// Enqueue a prepared event as `PENDING`.
    pub async fn enqueue(&self, event: &ChangeEvent) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection())
            .enqueue(event)
            .await
    }

    /// Every outbox event, oldest first.
    pub async fn list_outbox(&self) -> Result<Vec<ChangeEvent>> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection()).list_all().await
    }

    /// Events eligible for the next push, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<ChangeEvent>> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection())
            .list_pending()
            .await
    }

    /// Transition one event; returns whether a row changed.
    pub async fn mark_result(
        &self,
        event_id: &str,
        status: OutboxStatus,
        retry_count: u32,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection())
            .mark_result(event_id, status, retry_count)
            .await
    }

    /// Garbage-collect one `SENT` event.
    pub async fn purge(&self, event_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection())
            .purge(event_id)
            .await
    }

    /// Garbage-collect every `SENT` event.
    pub async fn purge_sent(&self) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection())
            .purge_sent()
            .await
    }

    /// Outbox event counts per status.
    pub async fn outbox_counts(&self) -> Result<OutboxCounts> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection()).counts().await
    }

    // ---------------------------------------------------------------------
    // Metadata
    // ---------------------------------------------------------------------

    /// Read a metadata value.
    pub async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        LibSqlMetaRepository::new(db.connection())
            .get_meta(key)
            .await
    }

    /// Write a metadata value.
    pub async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlMetaRepository::new(db.connection())
            .set_meta(key, value)
            .await
    }

    /// Remove a metadata value.
    pub async fn delete_meta(&self, key: &str) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlMetaRepository::new(db.connection())
            .delete_meta(key)
            .await
    }

    /// Stable per-installation identifier, generated on first use.
    pub async fn device_id(&self) -> Result<String> {
        let db = self.db.lock().await;
        ensure_device_id(db.connection()).await
    }

    /// Current pull watermark, if any pull or push has completed.
    pub async fn last_sync(&self) -> Result<Option<String>> {
        self.get_meta(META_LAST_SYNC).await
    }

    /// Move the watermark forward; earlier or unparseable values are ignored.
    pub async fn advance_watermark(&self, server_time: &str) -> Result<bool> {
        let db = self.db.lock().await;
        advance_watermark(db.connection(), server_time).await
    }

    /// Persisted bearer credential.
    pub async fn access_token(&self) -> Result<Option<String>> {
        self.get_meta(META_ACCESS_TOKEN).await
    }

    /// Persist a bearer credential.
    pub async fn set_access_token(&self, token: &str) -> Result<()> {
        self.set_meta(META_ACCESS_TOKEN, token).await
    }

    /// Forget the bearer credential.
    pub async fn clear_access_token(&self) -> Result<()> {
        self.delete_meta(META_ACCESS_TOKEN).await
    }

    // ---------------------------------------------------------------------
    // Sync bookkeeping
    // ---------------------------------------------------------------------

    /// Record push results and the server time in one transaction.
    pub async fn record_push_results(
        &self,
        transitions: &[EventTransition],
        server_time: &str,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        db::begin(conn).await?;
        let result = async {
            for transition in transitions {
                let changed = db::update_event_status(
                    conn,
                    &transition.event_id,
                    transition.status,
                    transition.retry_count,
                )
                .await?;
                if !changed {
                    tracing::debug!(
                        "Outbox event {} not updated (unknown or already sent)",
                        transition.event_id
                    );
                }
            }
            advance_watermark(conn, server_time).await?;
            Ok::<(), Error>(())
        }
        .await;
        db::finish(conn, result).await
    }

    /// Replace local records with pulled server snapshots, then advance the watermark.
    ///
    /// Returns the number of records written.
    pub async fn apply_remote_changes(
        &self,
        changes: &[(Collection, Vec<Record>)],
        server_time: &str,
    ) -> Result<usize> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let repo = LibSqlEntityRepository::new(conn);

        db::begin(conn).await?;
        let result = async {
            let mut written = 0;
            for (collection, records) in changes {
                for record in records {
                    repo.upsert(*collection, record).await?;
                    written += 1;
                }
            }
            advance_watermark(conn, server_time).await?;
            Ok::<usize, Error>(written)
        }
        .await;
        db::finish(conn, result).await
    }

    // ---------------------------------------------------------------------
    // Offline response cache
    // ---------------------------------------------------------------------

    /// Look up a cached response.
    pub async fn cache_lookup(&self, generation: &str, path: &str) -> Result<Option<CachedResponse>> {
        let db = self.db.lock().await;
        LibSqlResponseCache::new(db.connection())
            .lookup(generation, path)
            .await
    }

    /// Store a set of responses in one generation atomically.
    pub async fn cache_store_all(
        &self,
        generation: &str,
        responses: &[CachedResponse],
    ) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlResponseCache::new(db.connection())
            .store_all(generation, responses)
            .await
    }

    /// Drop every cache generation except `keep`.
    pub async fn cache_retain_only(&self, keep: &str) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        LibSqlResponseCache::new(db.connection())
            .retain_only(keep)
            .await
    }
}

async fn ensure_device_id(conn: &Connection) -> Result<String> {
    let meta = LibSqlMetaRepository::new(conn);
    if let Some(device_id) = meta.get_meta(META_DEVICE_ID).await? {
        return Ok(device_id);
    }

    let device_id = Uuid::now_v7().to_string();
    meta.set_meta(META_DEVICE_ID, &device_id).await?;
    tracing::info!("Generated device id {}", device_id);
    Ok(device_id)
}

async fn advance_watermark(conn: &Connection, server_time: &str) -> Result<bool> {
    let Some(candidate) = parse_iso_timestamp(server_time) else {
        tracing::warn!("Ignoring unparseable server time '{}'", server_time);
        return Ok(false);
    };

    let meta = LibSqlMetaRepository::new(conn);
    let current = meta
        .get_meta(META_LAST_SYNC)
        .await?
        .as_deref()
        .and_then(parse_iso_timestamp);

    if current.is_some_and(|current| candidate <= current) {
        return Ok(false);
    }

    meta.set_meta(META_LAST_SYNC, server_time.trim()).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_writes_entity_and_pending_event() {
        let store = LocalStore::open_in_memory().await.unwrap();

        let record = store
            .create(Collection::Products, fields(json!({"name": "Tea"})))
            .await
            .unwrap();

        let outbox = store.list_outbox().await.unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].entity_id, record.id);
        assert_eq!(outbox[0].operation, Operation::Create);
        assert_eq!(outbox[0].status, OutboxStatus::Pending);
        assert_eq!(outbox[0].device_id, store.device_id().await.unwrap());
        assert_eq!(store.get(Collection::Products, &record.id).await.unwrap(), Some(record));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_bumps_version_and_enqueues_snapshot() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let created = store
            .create(Collection::Products, fields(json!({"name": "Tea", "stock_qty": 5})))
            .await
            .unwrap();

        let updated = store
            .update(Collection::Products, &created.id, fields(json!({"stock_qty": 4})))
            .await
            .unwrap();

        assert_eq!(updated.version, created.version + 1);
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.field("name"), Some(&json!("Tea")));

        let outbox = store.list_outbox().await.unwrap();
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox[1].operation, Operation::Update);
        assert_eq!(outbox[1].payload_json["stock_qty"], json!(4));
        assert_eq!(outbox[1].payload_json["version"], json!(2));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_missing_entity_is_not_found() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let error = store
            .update(Collection::Customers, "nope", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
        assert!(store.list_outbox().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remove_deletes_and_enqueues_delete_event() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let created = store
            .create(Collection::Customers, fields(json!({"full_name": "Ann"})))
            .await
            .unwrap();

        store.remove(Collection::Customers, &created.id).await.unwrap();

        assert!(store.get(Collection::Customers, &created.id).await.unwrap().is_none());
        let outbox = store.list_outbox().await.unwrap();
        assert_eq!(outbox.last().map(|event| event.operation), Some(Operation::Delete));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn device_id_is_stable() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let first = store.device_id().await.unwrap();
        let second = store.device_id().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn watermark_only_moves_forward() {
        let store = LocalStore::open_in_memory().await.unwrap();

        assert!(store
            .advance_watermark("2024-05-01T10:00:00+00:00")
            .await
            .unwrap());
        assert!(!store
            .advance_watermark("2024-04-01T10:00:00+00:00")
            .await
            .unwrap());
        assert!(!store.advance_watermark("not a time").await.unwrap());
        assert!(store
            .advance_watermark("2024-05-01T10:00:01+00:00")
            .await
            .unwrap());

        assert_eq!(
            store.last_sync().await.unwrap().as_deref(),
            Some("2024-05-01T10:00:01+00:00")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_push_results_updates_events_and_watermark() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store
            .create(Collection::Products, fields(json!({"name": "Tea"})))
            .await
            .unwrap();
        let event = store.list_pending().await.unwrap().remove(0);

        store
            .record_push_results(
                &[
                    EventTransition {
                        event_id: event.event_id.clone(),
                        status: OutboxStatus::Sent,
                        retry_count: 0,
                    },
                    EventTransition {
                        event_id: "unknown".to_string(),
                        status: OutboxStatus::Failed,
                        retry_count: 1,
                    },
                ],
                "2024-05-01T10:00:00+00:00",
            )
            .await
            .unwrap();

        assert!(store.list_pending().await.unwrap().is_empty());
        assert_eq!(store.outbox_counts().await.unwrap().sent, 1);
        assert_eq!(
            store.last_sync().await.unwrap().as_deref(),
            Some("2024-05-01T10:00:00+00:00")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn apply_remote_changes_replaces_regardless_of_version() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let mut local: Record = serde_json::from_value(json!({
            "id": "P1", "name": "Local name", "version": 9, "updated_at": "2024-05-02T00:00:00Z"
        }))
        .unwrap();
        store.put(Collection::Products, &local).await.unwrap();

        local = serde_json::from_value(json!({
            "id": "P1", "name": "Server name", "version": 3, "updated_at": "2024-05-01T00:00:00Z"
        }))
        .unwrap();
        let written = store
            .apply_remote_changes(
                &[(Collection::Products, vec![local.clone()])],
                "2024-05-03T00:00:00+00:00",
            )
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(store.get(Collection::Products, "P1").await.unwrap(), Some(local));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_path_creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("stockroom.db");

        let store = LocalStore::open_path(&path).await.unwrap();
        assert_eq!(store.path(), Some(&path));
        assert!(path.exists());
    }
}
