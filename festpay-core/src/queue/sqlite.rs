use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{PendingRequestStore, QueueNotifier, QueueWatcher, StoreError};
use crate::entities::pending_request::{
    CountPendingRequests, DeletePendingRequest, GetPendingRequest,
    IncrementPendingRequestAttempts, InsertPendingRequest, ListPendingRequests,
    PendingRequestRow, SetPendingRequestParked,
};
use crate::entities::{PaymentRequest, QueuedRequest, RequestKind};
use crate::framework::DatabaseProcessor;

/// Queue store backed by a local SQLite file.
///
/// Every write is committed before the call returns, with `synchronous =
/// FULL`, so an acknowledged payment survives power loss.
pub struct SqliteRequestStore {
    db: DatabaseProcessor,
    write_lock: Mutex<()>,
    notifier: QueueNotifier,
}

impl SqliteRequestStore {
    /// Open (creating if needed) the queue database and apply migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(path = %path.as_ref().display(), "Opened request queue database");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an already migrated pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            db: DatabaseProcessor { pool },
            write_lock: Mutex::new(()),
            notifier: QueueNotifier::default(),
        }
    }

    pub async fn close(&self) {
        self.db.pool.close().await;
    }

    fn decode(rows: Vec<PendingRequestRow>) -> Result<Vec<QueuedRequest>, StoreError> {
        rows.into_iter()
            .map(|row| QueuedRequest::try_from(row).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl PendingRequestStore for SqliteRequestStore {
    async fn insert(
        &self,
        kind: RequestKind,
        request: &PaymentRequest,
    ) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(request)?;
        let _write = self.write_lock.lock().await;
        let created = self
            .db
            .process(InsertPendingRequest {
                id: request.id(),
                kind,
                payload,
                queued_at: OffsetDateTime::now_utc(),
            })
            .await?;
        if created {
            self.notifier.notify();
        }
        Ok(created)
    }

    async fn snapshot(&self) -> Result<Vec<QueuedRequest>, StoreError> {
        let rows = self.db.process(ListPendingRequests { parked: false }).await?;
        Self::decode(rows)
    }

    async fn parked(&self) -> Result<Vec<QueuedRequest>, StoreError> {
        let rows = self.db.process(ListPendingRequests { parked: true }).await?;
        Self::decode(rows)
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueuedRequest>, StoreError> {
        match self.db.process(GetPendingRequest { id }).await? {
            Some(row) => Ok(Some(QueuedRequest::try_from(row)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, id: Uuid) -> Result<bool, StoreError> {
        let _write = self.write_lock.lock().await;
        Ok(self.db.process(DeletePendingRequest { id }).await?)
    }

    async fn record_attempt(&self, id: Uuid) -> Result<(), StoreError> {
        let _write = self.write_lock.lock().await;
        self.db
            .process(IncrementPendingRequestAttempts { id })
            .await?;
        Ok(())
    }

    async fn park(&self, id: Uuid, reason: &str) -> Result<bool, StoreError> {
        let _write = self.write_lock.lock().await;
        Ok(self
            .db
            .process(SetPendingRequestParked {
                id,
                reason: Some(reason.to_string()),
            })
            .await?)
    }

    async fn unpark(&self, id: Uuid) -> Result<bool, StoreError> {
        let _write = self.write_lock.lock().await;
        let unparked = self
            .db
            .process(SetPendingRequestParked { id, reason: None })
            .await?;
        if unparked {
            self.notifier.notify();
        }
        Ok(unparked)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let count = self.db.process(CountPendingRequests).await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn subscribe(&self) -> QueueWatcher {
        self.notifier.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Amount, PaymentMethod, TagIdentity};
    use rust_decimal_macros::dec;

    fn request(uid: u64) -> PaymentRequest {
        PaymentRequest::new(
            TagIdentity::new(uid, Some(bytes::Bytes::from_static(b"\x01"))),
            Amount::new(dec!(12.50)).unwrap(),
            dec!(1),
            PaymentMethod::Card,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.sqlite");
        let (a, b) = (request(1), request(2));

        let store = SqliteRequestStore::open(&path).await.unwrap();
        assert!(store.insert(RequestKind::TopUp, &a).await.unwrap());
        assert!(store.insert(RequestKind::TopUp, &b).await.unwrap());
        assert!(!store.insert(RequestKind::TopUp, &a).await.unwrap());
        store.record_attempt(b.id()).await.unwrap();
        store.close().await;

        let store = SqliteRequestStore::open(&path).await.unwrap();
        let entries = store.snapshot().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].request, a);
        assert_eq!(entries[1].request, b);
        assert_eq!(entries[1].attempts, 1);
        assert!(entries[0].seq < entries[1].seq);
    }

    #[tokio::test]
    async fn test_queued_at_keeps_full_precision() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.sqlite");
        let a = request(1);

        let store = SqliteRequestStore::open(&path).await.unwrap();
        let before = OffsetDateTime::now_utc();
        store.insert(RequestKind::TopUp, &a).await.unwrap();
        let after = OffsetDateTime::now_utc();
        let stored = store.get(a.id()).await.unwrap().unwrap().queued_at;
        store.close().await;

        let store = SqliteRequestStore::open(&path).await.unwrap();
        let reloaded = store.get(a.id()).await.unwrap().unwrap().queued_at;
        assert_eq!(reloaded, stored);
        assert!(before <= reloaded && reloaded <= after, "{before} <= {reloaded} <= {after}");
    }

    #[test]
    fn test_row_timestamp_is_nanoseconds() {
        let request = request(3);
        let row = PendingRequestRow {
            seq: 1,
            id: request.id().to_string(),
            kind: RequestKind::TopUp,
            payload: serde_json::to_string(&request).unwrap(),
            attempts: 0,
            queued_at: 1_700_000_000_123_456_789,
            parked_reason: None,
        };

        let entry = QueuedRequest::try_from(row).unwrap();
        assert_eq!(entry.queued_at.unix_timestamp(), 1_700_000_000);
        assert_eq!(entry.queued_at.nanosecond(), 123_456_789);
    }

    #[tokio::test]
    async fn test_park_remove_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteRequestStore::open(dir.path().join("queue.sqlite"))
            .await
            .unwrap();
        let (a, b) = (request(1), request(2));
        store.insert(RequestKind::TopUp, &a).await.unwrap();
        store.insert(RequestKind::TopUp, &b).await.unwrap();

        assert!(store.park(a.id(), "insufficient funds").await.unwrap());
        assert_eq!(store.snapshot().await.unwrap().len(), 1);
        let parked = store.parked().await.unwrap();
        assert_eq!(parked[0].parked.as_deref(), Some("insufficient funds"));
        assert_eq!(store.len().await.unwrap(), 2);

        assert!(store.unpark(a.id()).await.unwrap());
        assert!(store.remove(b.id()).await.unwrap());
        assert!(!store.remove(b.id()).await.unwrap());
        assert_eq!(store.get(b.id()).await.unwrap(), None);
        assert_eq!(store.snapshot().await.unwrap().len(), 1);
    }
}
