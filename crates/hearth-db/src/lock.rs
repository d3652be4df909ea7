//! # Lock Registry
//!
//! In-process async locks that serialize operations touching the same room,
//! booking, order or bill.
//!
//! ## Why Locks on Top of Transactions?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Check-then-act race without locks                                      │
//! │                                                                         │
//! │  Request A: read room 101 allocations ─┐                                │
//! │  Request B: read room 101 allocations ─┼─ both see "free"               │
//! │  Request A: insert [10, 12)            │                                │
//! │  Request B: insert [11, 13)            ┘  ❌ double booking             │
//! │                                                                         │
//! │  With locks: B waits on "room:101" until A commits, then sees A's row.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Deadlock Freedom
//! An operation asks for all of its keys in a single [`LockRegistry::acquire`]
//! call. Keys are sorted and deduplicated before locking, so two operations
//! always lock shared keys in the same order. Locks are taken before the
//! transaction begins and released when the returned [`LockSet`] drops.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Entries are pruned once the map grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

/// Key for a room's allocation set.
pub fn room_key(room_id: &str) -> String {
    format!("room:{room_id}")
}

/// Key for a booking (lifecycle events, hotel billing).
pub fn booking_key(booking_id: &str) -> String {
    format!("booking:{booking_id}")
}

/// Key for an order (status transitions, restaurant billing).
pub fn order_key(order_id: &str) -> String {
    format!("order:{order_id}")
}

/// Key for a bill (payments, cancellation).
pub fn bill_key(bill_id: &str) -> String {
    format!("bill:{bill_id}")
}

/// Registry of named async mutexes.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Guards held for the duration of one operation.
#[derive(Debug)]
pub struct LockSet {
    keys: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockSet {
    /// Keys held, in acquisition order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks every key, in sorted order.
    pub async fn acquire<I>(&self, keys: I) -> LockSet
    where
        I: IntoIterator<Item = String>,
    {
        let keys: Vec<String> = keys.into_iter().collect::<BTreeSet<_>>().into_iter().collect();

        let mutexes: Vec<Arc<Mutex<()>>> = {
            let mut map = self.locks.lock().await;
            if map.len() > PRUNE_THRESHOLD {
                map.retain(|_, m| Arc::strong_count(m) > 1);
            }
            keys.iter()
                .map(|k| map.entry(k.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }
        trace!(keys = ?keys, "Locks acquired");

        LockSet {
            keys,
            _guards: guards,
        }
    }
}
