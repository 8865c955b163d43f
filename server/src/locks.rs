// shelf-server/src/locks.rs

//! Keyed async mutexes serializing writes per product and per order.
//!
//! Order commits lock every product on the order; payment confirmation locks the order.
//! Unrelated orders never wait on each other.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{event, Level};

/// Held locks; all are released on drop.
#[must_use = "locks are released as soon as the guard is dropped"]
pub struct LockGuard {
  _held: Vec<OwnedMutexGuard<()>>,
}

#[derive(Default)]
pub struct KeyedLocks {
  slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
  /// Locks every key, in sorted order with duplicates removed, so two callers sharing
  /// keys can't deadlock.
  pub async fn acquire<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> LockGuard {
    let mut keys: Vec<&str> = keys.into_iter().collect();
    keys.sort_unstable();
    keys.dedup();

    let mut held = Vec::with_capacity(keys.len());
    for key in keys {
      let slot = self.slot(key);
      held.push(slot.lock_owned().await);
    }
    LockGuard { _held: held }
  }

  /// Number of keys with a live slot.
  pub fn tracked(&self) -> usize {
    self.slots.lock().len()
  }

  fn slot(&self, key: &str) -> Arc<AsyncMutex<()>> {
    let mut slots = self.slots.lock();
    // A slot nobody holds or waits on has only the map's reference left.
    let before = slots.len();
    slots.retain(|_, slot| Arc::strong_count(slot) > 1);
    if slots.len() < before {
      event!(Level::TRACE, pruned = before - slots.len(), "Pruned idle lock slots.");
    }
    Arc::clone(slots.entry(key.to_string()).or_default())
  }
}

#[derive(Default)]
pub struct EntityLocks {
  pub products: KeyedLocks,
  pub orders: KeyedLocks,
}

impl EntityLocks {
  pub fn new() -> Self {
    Self::default()
  }
}
