use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

const PRUNE_THRESHOLD: usize = 256;

/// Per-key reader/writer locks. Exclusive holders of the same key queue up; different keys
/// never contend.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<RwLock<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

/// Shared handle to one key's lock. [`KeySlot::lock`] is exclusive, [`KeySlot::share`] lets
/// several holders in at once while keeping exclusive holders out.
#[derive(Debug, Clone)]
pub struct KeySlot(Arc<RwLock<()>>);

// A panicking holder cannot leave `()` inconsistent, so poisoning is ignored.
impl KeySlot {
    pub fn lock(&self) -> RwLockWriteGuard<'_, ()> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn share(&self) -> RwLockReadGuard<'_, ()> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn slot(&self, key: &K) -> KeySlot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.len() >= PRUNE_THRESHOLD {
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        }
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone();
        KeySlot(slot)
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
