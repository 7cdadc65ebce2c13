use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::{PendingRequestStore, QueueWatcher, StoreError};
use crate::entities::{PaymentRequest, QueuedRequest, RequestKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// A request with the same id is already stored. Nothing changed.
    AlreadyQueued,
}

/// Payments waiting for backend confirmation.
///
/// Cheap to clone: clones share the store.
#[derive(Clone)]
pub struct DurableRequestQueue {
    store: Arc<dyn PendingRequestStore>,
}

impl DurableRequestQueue {
    pub fn new(store: Arc<dyn PendingRequestStore>) -> Self {
        Self { store }
    }

    /// Persist a request for booking. Returns once the store has it.
    pub async fn push(
        &self,
        kind: RequestKind,
        request: &PaymentRequest,
    ) -> Result<PushOutcome, StoreError> {
        if self.store.insert(kind, request).await? {
            info!(
                request_id = %request.id(),
                %kind,
                method = %request.method(),
                total = %request.total(),
                "Request queued for booking"
            );
            Ok(PushOutcome::Queued)
        } else {
            info!(request_id = %request.id(), "Request already queued");
            Ok(PushOutcome::AlreadyQueued)
        }
    }

    /// Replayable entries in insertion order.
    pub async fn pending(&self) -> Result<Vec<QueuedRequest>, StoreError> {
        self.store.snapshot().await
    }

    pub async fn parked(&self) -> Result<Vec<QueuedRequest>, StoreError> {
        self.store.parked().await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<QueuedRequest>, StoreError> {
        self.store.get(id).await
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        self.store.len().await
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        self.store.is_empty().await
    }

    /// Drop an entry without booking it. This loses the booking for good and
    /// is meant for operators resolving it by other means.
    pub async fn discard(&self, id: Uuid) -> Result<bool, StoreError> {
        let removed = self.store.remove(id).await?;
        if removed {
            warn!(request_id = %id, "Queued request discarded by operator");
        }
        Ok(removed)
    }

    /// Move a parked entry back into the replay set.
    pub async fn requeue(&self, id: Uuid) -> Result<bool, StoreError> {
        let requeued = self.store.unpark(id).await?;
        if requeued {
            info!(request_id = %id, "Parked request requeued");
        }
        Ok(requeued)
    }

    pub fn subscribe(&self) -> QueueWatcher {
        self.store.subscribe()
    }

    pub(crate) fn store(&self) -> &dyn PendingRequestStore {
        self.store.as_ref()
    }
}
