use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// In-process map that is cleared wholesale once it holds `capacity` entries.
/// Inserting an existing key replaces its value without clearing; a cleared
/// entry is simply looked up again from its source.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    name: &'static str,
    capacity: usize,
    map: RwLock<HashMap<K, V>>,
}

impl<K: Eq + Hash, V: Clone> BoundedCache<K, V> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            map: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);

        if map.len() >= self.capacity && !map.contains_key(&key) {
            debug!("Clearing {} cache at {} entries", self.name, map.len());
            map.clear();
        }

        map.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.map.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
