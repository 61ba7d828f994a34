//! In-process per-order write locks.
//!
//! Serializes multi-statement writes to the same order within one process.
//! Cross-process writers are covered by the optimistic `version` column.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use clinicdesk_core::OrderId;

/// One async mutex per order id.
///
/// The registry only holds weak references; an order's entry disappears once
/// no guard or waiter refers to it.
#[derive(Debug, Clone, Default)]
pub struct OrderLocks {
    inner: Arc<Mutex<HashMap<OrderId, Weak<AsyncMutex<()>>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`. Released when the guard drops.
    pub async fn acquire(&self, id: OrderId) -> OwnedMutexGuard<()> {
        self.lock_for(id).lock_owned().await
    }

    /// Number of orders with a live lock.
    pub fn tracked(&self) -> usize {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, lock| lock.strong_count() > 0);
        map.len()
    }

    fn lock_for(&self, id: OrderId) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, lock| lock.strong_count() > 0);

        if let Some(existing) = map.get(&id).and_then(Weak::upgrade) {
            return existing;
        }
        let lock = Arc::new(AsyncMutex::new(()));
        map.insert(id, Arc::downgrade(&lock));
        lock
    }
}
