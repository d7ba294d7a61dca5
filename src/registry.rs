use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::domain::{Amount, Authorization, AuthorizationRegistry, HoldState, Id, Timestamp};

type OrderKey = (Timestamp, Id);

#[derive(Default, Debug)]
struct Entries {
    // ordered by (created_at, id): queries come back already sorted
    ordered: BTreeMap<OrderKey, Authorization>,
    by_id: HashMap<Id, OrderKey>,
}

/// Lock-protected registry of in-flight holds.
#[derive(Default, Debug)]
pub struct MemoryRegistry {
    entries: Mutex<Entries>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    /// Every entry, oldest first.
    pub fn snapshot(&self) -> Vec<Authorization> {
        self.lock().ordered.values().cloned().collect()
    }
}

impl AuthorizationRegistry for MemoryRegistry {
    fn insert(&self, auth: Authorization) {
        let mut entries = self.lock();
        let key = (auth.created_at, auth.id);
        if let Some(previous) = entries.by_id.insert(auth.id, key) {
            warn!(hold_id = %auth.id, "replacing registry entry with the same id");
            entries.ordered.remove(&previous);
        }
        debug!(%auth, "registered hold");
        entries.ordered.insert(key, auth);
    }

    fn delete(&self, id: Id) {
        let mut entries = self.lock();
        if let Some(key) = entries.by_id.remove(&id) {
            entries.ordered.remove(&key);
            debug!(hold_id = %id, "removed hold from registry");
        }
    }

    fn set_state(&self, id: Id, state: HoldState) -> bool {
        let mut entries = self.lock();
        let Some(key) = entries.by_id.get(&id).copied() else {
            return false;
        };
        match entries.ordered.get_mut(&key) {
            Some(auth) => {
                auth.state = state;
                true
            }
            None => false,
        }
    }

    fn query(&self, account_id: Id, amount: Amount, state: HoldState) -> Vec<Authorization> {
        self.lock()
            .ordered
            .values()
            .filter(|a| a.account_id == account_id && a.amount == amount && a.state == state)
            .cloned()
            .collect()
    }

    fn contains(&self, id: Id) -> bool {
        self.lock().by_id.contains_key(&id)
    }
}
