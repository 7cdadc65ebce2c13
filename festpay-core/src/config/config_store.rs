//! Hot-swappable configuration values.
//!
//! `ConfigStore<T>` keeps the current value in a `watch` channel, so readers
//! always see the latest value without locking a separate `RwLock`, and
//! watchers can `await` the next replacement.

use std::sync::Arc;
use tokio::sync::watch;

/// A shared configuration value with change notification.
///
/// Clones share the same value. Replacing it through any clone wakes every
/// [`ConfigWatcher`].
pub struct ConfigStore<T> {
    tx: Arc<watch::Sender<T>>,
}

/// Receives notifications when a [`ConfigStore`] is updated.
pub struct ConfigWatcher<T> {
    rx: watch::Receiver<T>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the stored value and notify all watchers.
    pub fn update(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Borrow the current value.
    ///
    /// The returned guard holds a read lock: do not keep it across an
    /// `.await`.
    pub fn read(&self) -> watch::Ref<'_, T> {
        self.tx.borrow()
    }

    pub fn subscribe(&self) -> ConfigWatcher<T> {
        ConfigWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone> ConfigStore<T> {
    /// Clone out the current value.
    pub fn snapshot(&self) -> T {
        self.tx.borrow().clone()
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Default> Default for ConfigStore<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> ConfigWatcher<T> {
    /// Wait until the store is updated.
    ///
    /// Returns `Err` once every [`ConfigStore`] clone has been dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }
}

impl<T: Clone> ConfigWatcher<T> {
    /// The current value, marking it as seen.
    pub fn current(&mut self) -> T {
        self.rx.borrow_and_update().clone()
    }
}
