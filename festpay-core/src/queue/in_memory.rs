use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{PendingRequestStore, QueueNotifier, QueueWatcher, StoreError};
use crate::entities::{PaymentRequest, QueuedRequest, RequestKind};

/// Non-durable store for tests and terminals that accept losing the queue
/// on restart.
#[derive(Clone, Default)]
pub struct InMemoryRequestStore {
    inner: Arc<Mutex<Entries>>,
    notifier: QueueNotifier,
}

#[derive(Default)]
struct Entries {
    next_seq: i64,
    by_seq: BTreeMap<i64, QueuedRequest>,
    seq_of: HashMap<Uuid, i64>,
}

impl Entries {
    fn get_mut(&mut self, id: Uuid) -> Option<&mut QueuedRequest> {
        let seq = self.seq_of.get(&id)?;
        self.by_seq.get_mut(seq)
    }

    fn filtered(&self, parked: bool) -> Vec<QueuedRequest> {
        self.by_seq
            .values()
            .filter(|entry| entry.is_parked() == parked)
            .cloned()
            .collect()
    }
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingRequestStore for InMemoryRequestStore {
    async fn insert(
        &self,
        kind: RequestKind,
        request: &PaymentRequest,
    ) -> Result<bool, StoreError> {
        let mut entries = self.inner.lock().await;
        if entries.seq_of.contains_key(&request.id()) {
            return Ok(false);
        }
        entries.next_seq += 1;
        let seq = entries.next_seq;
        entries.seq_of.insert(request.id(), seq);
        entries.by_seq.insert(
            seq,
            QueuedRequest {
                seq,
                id: request.id(),
                kind,
                request: request.clone(),
                attempts: 0,
                queued_at: OffsetDateTime::now_utc(),
                parked: None,
            },
        );
        drop(entries);
        self.notifier.notify();
        Ok(true)
    }

    async fn snapshot(&self) -> Result<Vec<QueuedRequest>, StoreError> {
        Ok(self.inner.lock().await.filtered(false))
    }

    async fn parked(&self) -> Result<Vec<QueuedRequest>, StoreError> {
        Ok(self.inner.lock().await.filtered(true))
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueuedRequest>, StoreError> {
        let entries = self.inner.lock().await;
        Ok(entries
            .seq_of
            .get(&id)
            .and_then(|seq| entries.by_seq.get(seq))
            .cloned())
    }

    async fn remove(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut entries = self.inner.lock().await;
        match entries.seq_of.remove(&id) {
            Some(seq) => Ok(entries.by_seq.remove(&seq).is_some()),
            None => Ok(false),
        }
    }

    async fn record_attempt(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(entry) = self.inner.lock().await.get_mut(id) {
            entry.attempts = entry.attempts.saturating_add(1);
        }
        Ok(())
    }

    async fn park(&self, id: Uuid, reason: &str) -> Result<bool, StoreError> {
        match self.inner.lock().await.get_mut(id) {
            Some(entry) => {
                entry.parked = Some(reason.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn unpark(&self, id: Uuid) -> Result<bool, StoreError> {
        let unparked = match self.inner.lock().await.get_mut(id) {
            Some(entry) if entry.is_parked() => {
                entry.parked = None;
                entry.attempts = 0;
                true
            }
            _ => false,
        };
        if unparked {
            self.notifier.notify();
        }
        Ok(unparked)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.lock().await.by_seq.len())
    }

    fn subscribe(&self) -> QueueWatcher {
        self.notifier.subscribe()
    }
}
