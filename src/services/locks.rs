//! Per-account serialization for stores without row locks.
//!
//! Locks are always taken in ascending account id order, so two operations
//! over overlapping accounts (for example `1 -> 2` and `2 -> 1`) can never
//! wait on each other in a cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::account::AccountId;

type SlotMap = HashMap<AccountId, Arc<AsyncMutex<()>>>;
type Slots = Mutex<SlotMap>;

/// Table of per-account async mutexes, shared by the services that mutate balances.
///
/// An entry lives only while some operation holds or waits for it; the last
/// guard to release an account removes the entry.
#[derive(Debug, Default)]
pub struct AccountLocks {
    slots: Arc<Slots>,
}

/// Holds the locks for a set of accounts until dropped.
#[derive(Debug)]
pub struct AccountGuard {
    held: Vec<(AccountId, OwnedMutexGuard<()>)>,
    slots: Arc<Slots>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every account in `ids`, duplicates ignored, in ascending id order.
    pub async fn lock(&self, ids: &[AccountId]) -> AccountGuard {
        let mut ordered = ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        // Built first so a lock future dropped mid-way still prunes what it took
        let mut guard = AccountGuard {
            held: Vec::with_capacity(ordered.len()),
            slots: self.slots.clone(),
        };
        for id in ordered {
            let slot = self.slot(id);
            guard.held.push((id, slot.lock_owned().await));
        }

        guard
    }

    /// Number of accounts currently tracked.
    pub fn tracked(&self) -> usize {
        lock_slots(&self.slots).len()
    }

    fn slot(&self, id: AccountId) -> Arc<AsyncMutex<()>> {
        lock_slots(&self.slots).entry(id).or_default().clone()
    }
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        let ids: Vec<AccountId> = self
            .held
            .drain(..)
            .map(|(id, guard)| {
                drop(guard);
                id
            })
            .collect();

        // Clones are only made under this lock; a count of one means no holder or waiter
        let mut slots = lock_slots(&self.slots);
        for id in ids {
            if slots.get(&id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(&id);
            }
        }
    }
}

fn lock_slots(slots: &Slots) -> MutexGuard<'_, SlotMap> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}
