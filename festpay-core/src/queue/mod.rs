//! Durable queue of bookings awaiting backend confirmation.
//!
//! A payment enters the queue before any network call is made and leaves it
//! only when the backend confirms the booking or an operator discards it.
//! The store is behind [`PendingRequestStore`] so the terminal can run on
//! SQLite while tests use the in-memory store.

pub mod durable;
pub mod in_memory;
pub mod sqlite;

pub use durable::{DurableRequestQueue, PushOutcome};
pub use in_memory::InMemoryRequestStore;
pub use sqlite::SqliteRequestStore;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use crate::entities::pending_request::RowDecodeError;
use crate::entities::{PaymentRequest, QueuedRequest, RequestKind};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt queue entry: {0}")]
    Corrupt(#[from] RowDecodeError),
}

/// Storage port of the durable queue.
///
/// Implementations serialize their writes. Entries are returned in
/// insertion order.
#[async_trait]
pub trait PendingRequestStore: Send + Sync {
    /// Store a request. Returns `false` if one with the same id exists.
    async fn insert(&self, kind: RequestKind, request: &PaymentRequest)
    -> Result<bool, StoreError>;

    /// Every entry that is not parked.
    async fn snapshot(&self) -> Result<Vec<QueuedRequest>, StoreError>;

    async fn parked(&self) -> Result<Vec<QueuedRequest>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<QueuedRequest>, StoreError>;

    /// Returns whether the entry existed.
    async fn remove(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn record_attempt(&self, id: Uuid) -> Result<(), StoreError>;

    /// Exclude an entry from replay, keeping it stored with the reason.
    async fn park(&self, id: Uuid, reason: &str) -> Result<bool, StoreError>;

    /// Make a parked entry replayable again with a fresh attempt count.
    async fn unpark(&self, id: Uuid) -> Result<bool, StoreError>;

    /// All stored entries, parked ones included.
    async fn len(&self) -> Result<usize, StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    /// Change notifications for entries entering the replay set.
    fn subscribe(&self) -> QueueWatcher;
}

pub type PendingRequestStoreBox = Arc<dyn PendingRequestStore>;

/// Version counter bumped whenever an entry enters the replay set.
#[derive(Debug, Clone)]
pub(crate) struct QueueNotifier {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for QueueNotifier {
    fn default() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }
}

impl QueueNotifier {
    pub(crate) fn notify(&self) {
        self.tx.send_modify(|version| *version += 1);
    }

    pub(crate) fn subscribe(&self) -> QueueWatcher {
        QueueWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receives a notification per batch of queue additions.
pub struct QueueWatcher {
    rx: watch::Receiver<u64>,
}

impl QueueWatcher {
    /// Wait for an addition not yet marked as seen.
    ///
    /// Returns `Err` once the store is gone.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }

    /// Mark every addition so far as seen. Call this before taking a
    /// snapshot so that an insert racing the snapshot still wakes the next
    /// `changed()`.
    pub fn mark_seen(&mut self) -> u64 {
        *self.rx.borrow_and_update()
    }
}
