//! Outbox repository implementation

use crate::error::{Error, Result};
use crate::models::{ChangeEvent, OutboxCounts, OutboxStatus};
use libsql::Connection;

/// Trait for the pending-change queue (async)
#[allow(async_fn_in_trait)]
pub trait OutboxRepository {
    /// Insert a change event as `PENDING` with zero retries
    async fn enqueue(&self, event: &ChangeEvent) -> Result<()>;

    /// Get one event by id
    async fn get(&self, event_id: &str) -> Result<Option<ChangeEvent>>;

    /// Every event, oldest first
    async fn list_all(&self) -> Result<Vec<ChangeEvent>>;

    /// `PENDING` and `FAILED` events, oldest first
    async fn list_pending(&self) -> Result<Vec<ChangeEvent>>;

    /// Transition one event; unknown ids and already-sent events are left alone
    async fn mark_result(&self, event_id: &str, status: OutboxStatus, retry_count: u32)
        -> Result<bool>;

    /// Remove a `SENT` event
    async fn purge(&self, event_id: &str) -> Result<bool>;

    /// Remove every `SENT` event
    async fn purge_sent(&self) -> Result<u64>;

    /// Event counts per status
    async fn counts(&self) -> Result<OutboxCounts>;
}

/// libSQL implementation of `OutboxRepository`
pub struct LibSqlOutboxRepository<'a> {
    conn: &'a Connection,
}

const EVENT_COLUMNS: &str = "event_id, entity_type, entity_id, operation, payload_json, \
                             device_id, created_at, status, retry_count";

/// Insert an event row; shared with the entity repository's transactional writes
pub(crate) async fn insert_event(conn: &Connection, event: &ChangeEvent) -> Result<()> {
    let payload = serde_json::to_string(&event.payload_json)?;
    conn.execute(
        &format!(
            "INSERT INTO outbox ({EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        libsql::params![
            event.event_id.as_str(),
            event.entity_type.as_str(),
            event.entity_id.as_str(),
            event.operation.as_str(),
            payload,
            event.device_id.as_str(),
            event.created_at.as_str(),
            OutboxStatus::Pending.as_str(),
            0_i64
        ],
    )
    .await?;
    Ok(())
}

/// Update one event's status without opening a transaction
pub(crate) async fn update_status(
    conn: &Connection,
    event_id: &str,
    status: OutboxStatus,
    retry_count: u32,
) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE outbox SET status = ?1, retry_count = ?2
             WHERE event_id = ?3 AND status != 'SENT'",
            libsql::params![status.as_str(), i64::from(retry_count), event_id],
        )
        .await?;
    Ok(rows > 0)
}

impl<'a> LibSqlOutboxRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn query_events(&self, sql: &str) -> Result<Vec<ChangeEvent>> {
        let mut rows = self.conn.query(sql, ()).await?;
        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(Self::parse_event(&row)?);
        }
        Ok(events)
    }

    /// Parse a change event from a database row
    fn parse_event(row: &libsql::Row) -> Result<ChangeEvent> {
        let payload: String = row.get(4)?;
        let retry_count: i64 = row.get(8)?;
        Ok(ChangeEvent {
            event_id: row.get(0)?,
            entity_type: row.get::<String>(1)?.parse()?,
            entity_id: row.get(2)?,
            operation: row.get::<String>(3)?.parse()?,
            payload_json: serde_json::from_str(&payload)?,
            device_id: row.get(5)?,
            created_at: row.get(6)?,
            status: row.get::<String>(7)?.parse()?,
            retry_count: u32::try_from(retry_count)
                .map_err(|_| Error::Database(format!("invalid retry_count {retry_count}")))?,
        })
    }
}

impl OutboxRepository for LibSqlOutboxRepository<'_> {
    async fn enqueue(&self, event: &ChangeEvent) -> Result<()> {
        insert_event(self.conn, event).await
    }

    async fn get(&self, event_id: &str) -> Result<Option<ChangeEvent>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM outbox WHERE event_id = ?"),
                [event_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_event(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<ChangeEvent>> {
        self.query_events(&format!(
            "SELECT {EVENT_COLUMNS} FROM outbox ORDER BY created_at ASC, seq ASC"
        ))
        .await
    }

    async fn list_pending(&self) -> Result<Vec<ChangeEvent>> {
        self.query_events(&format!(
            "SELECT {EVENT_COLUMNS} FROM outbox
             WHERE status IN ('PENDING', 'FAILED')
             ORDER BY created_at ASC, seq ASC"
        ))
        .await
    }

    async fn mark_result(
        &self,
        event_id: &str,
        status: OutboxStatus,
        retry_count: u32,
    ) -> Result<bool> {
        update_status(self.conn, event_id, status, retry_count).await
    }

    async fn purge(&self, event_id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM outbox WHERE event_id = ? AND status = 'SENT'",
                [event_id],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn purge_sent(&self) -> Result<u64> {
        let rows = self
            .conn
            .execute("DELETE FROM outbox WHERE status = 'SENT'", ())
            .await?;
        Ok(rows)
    }

    async fn counts(&self) -> Result<OutboxCounts> {
        let mut rows = self
            .conn
            .query("SELECT status, COUNT(*) FROM outbox GROUP BY status", ())
            .await?;

        let mut counts = OutboxCounts::default();
        while let Some(row) = rows.next().await? {
            let status: OutboxStatus = row.get::<String>(0)?.parse()?;
            let count: i64 = row.get(1)?;
            counts.add(status, usize::try_from(count).unwrap_or_default());
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Collection, Operation, Record};
    use pretty_assertions::assert_eq;
    use serde_json::Map;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn event_at(created_at: &str) -> ChangeEvent {
        let record = Record::new(Map::new());
        let mut event =
            ChangeEvent::for_record(Collection::Products, Operation::Create, &record, "device-1");
        event.created_at = created_at.to_string();
        event
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_resets_status_and_retries() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        let mut event = event_at("2024-01-01T00:00:00.000000Z");
        event.status = OutboxStatus::Failed;
        event.retry_count = 7;
        repo.enqueue(&event).await.unwrap();

        let stored = repo.get(&event.event_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert_eq!(stored.retry_count, 0);
        assert_eq!(stored.payload_json, event.payload_json);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_pending_oldest_first_excludes_sent() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        let newest = event_at("2024-01-03T00:00:00.000000Z");
        let oldest = event_at("2024-01-01T00:00:00.000000Z");
        let middle = event_at("2024-01-02T00:00:00.000000Z");
        let sent = event_at("2023-12-31T00:00:00.000000Z");
        for event in [&newest, &oldest, &middle, &sent] {
            repo.enqueue(event).await.unwrap();
        }
        repo.mark_result(&middle.event_id, OutboxStatus::Failed, 1)
            .await
            .unwrap();
        repo.mark_result(&sent.event_id, OutboxStatus::Sent, 0)
            .await
            .unwrap();

        let pending = repo.list_pending().await.unwrap();
        let ids = pending
            .iter()
            .map(|event| event.event_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec![
                oldest.event_id.as_str(),
                middle.event_id.as_str(),
                newest.event_id.as_str()
            ]
        );
        assert_eq!(pending[1].status, OutboxStatus::Failed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_result_unknown_event_is_noop() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        let changed = repo
            .mark_result("does-not-exist", OutboxStatus::Sent, 0)
            .await
            .unwrap();
        assert!(!changed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sent_never_regresses() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        let event = event_at("2024-01-01T00:00:00.000000Z");
        repo.enqueue(&event).await.unwrap();
        assert!(repo
            .mark_result(&event.event_id, OutboxStatus::Sent, 0)
            .await
            .unwrap());

        for status in [OutboxStatus::Pending, OutboxStatus::Failed] {
            assert!(!repo.mark_result(&event.event_id, status, 4).await.unwrap());
        }

        let stored = repo.get(&event.event_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OutboxStatus::Sent);
        assert_eq!(stored.retry_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_purge_only_removes_sent() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        let pending = event_at("2024-01-01T00:00:00.000000Z");
        let sent = event_at("2024-01-02T00:00:00.000000Z");
        repo.enqueue(&pending).await.unwrap();
        repo.enqueue(&sent).await.unwrap();
        repo.mark_result(&sent.event_id, OutboxStatus::Sent, 0)
            .await
            .unwrap();

        assert!(!repo.purge(&pending.event_id).await.unwrap());
        assert!(repo.purge(&sent.event_id).await.unwrap());
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_counts_by_status() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        let events = [
            event_at("2024-01-01T00:00:00.000000Z"),
            event_at("2024-01-02T00:00:00.000000Z"),
            event_at("2024-01-03T00:00:00.000000Z"),
        ];
        for event in &events {
            repo.enqueue(event).await.unwrap();
        }
        repo.mark_result(&events[0].event_id, OutboxStatus::Sent, 0)
            .await
            .unwrap();
        repo.mark_result(&events[1].event_id, OutboxStatus::Failed, 1)
            .await
            .unwrap();

        let counts = repo.counts().await.unwrap();
        assert_eq!(
            counts,
            OutboxCounts {
                pending: 1,
                sent: 1,
                failed: 1
            }
        );
        assert_eq!(counts.total(), 3);

        assert_eq!(repo.purge_sent().await.unwrap(), 1);
        assert_eq!(repo.counts().await.unwrap().sent, 0);
    }
}
