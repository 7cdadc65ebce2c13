use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use super::sdk::{ActivityResult, CallbackChannel};

/// Routes SDK activity results to the task waiting on their channel.
///
/// [`deliver`](Self::deliver) is called synchronously from the SDK callback,
/// so the waiter table sits behind a std mutex that is never held across an
/// await.
#[derive(Debug, Clone, Default)]
pub struct CallbackRouter {
    waiters: Arc<Mutex<HashMap<CallbackChannel, oneshot::Sender<ActivityResult>>>>,
}

impl CallbackRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next result on `channel`.
    ///
    /// A previous waiter on the same channel is dropped and its receiver
    /// resolves with an error.
    pub fn register(&self, channel: CallbackChannel) -> oneshot::Receiver<ActivityResult> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        if waiters.insert(channel, tx).is_some() {
            tracing::warn!(?channel, "Replaced an unanswered callback waiter");
        }
        rx
    }

    pub fn cancel(&self, channel: CallbackChannel) {
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        waiters.remove(&channel);
    }

    /// Hand a result from the SDK to its waiter.
    ///
    /// Returns `false` for unknown request codes and for results nobody is
    /// waiting for.
    pub fn deliver(&self, request_code: i32, result: ActivityResult) -> bool {
        let Some(channel) = CallbackChannel::from_code(request_code) else {
            tracing::debug!(request_code, "Ignoring result for unknown request code");
            return false;
        };
        let waiter = self
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&channel);
        match waiter {
            Some(tx) => tx.send(result).is_ok(),
            None => {
                tracing::debug!(?channel, "Ignoring result with no waiter");
                false
            }
        }
    }
}
