//! In-memory state store for testing and single-node runs

use orakel_core::{
    OrakelResult, StateChange, StateMutator, StateProvider, StateVersion,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::store::{StateDiff, StateEntry, StateStore};

/// In-memory state store.
///
/// Backed by a `BTreeMap` so prefix scans come back in key order on every replica.
pub struct MemoryStateStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    version: RwLock<StateVersion>,
    history: RwLock<Vec<StateDiff>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            version: RwLock::new(StateVersion::new(0)),
            history: RwLock::new(Vec::new()),
        }
    }

    pub fn with_data(data: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        let store = Self::new();
        store.data.write().extend(data);
        store
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryStateStore {
    fn clone(&self) -> Self {
        Self {
            data: RwLock::new(self.data.read().clone()),
            version: RwLock::new(*self.version.read()),
            history: RwLock::new(Vec::new()),
        }
    }
}

impl StateProvider for MemoryStateStore {
    fn version(&self) -> StateVersion {
        *self.version.read()
    }

    fn get(&self, key: &[u8]) -> OrakelResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn exists(&self, key: &[u8]) -> OrakelResult<bool> {
        Ok(self.data.read().contains_key(key))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> OrakelResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl StateMutator for MemoryStateStore {
    fn set(&self, key: &[u8], value: &[u8]) -> OrakelResult<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> OrakelResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn apply_batch(&self, changes: Vec<StateChange>) -> OrakelResult<StateVersion> {
        let mut data = self.data.write();
        let mut version = self.version.write();

        let old_version = *version;
        let new_version = old_version.next();
        let mut diff = StateDiff::new(old_version, new_version);

        for change in changes {
            match change {
                StateChange::Set { key, value } => {
                    diff.add(key.clone(), value.clone());
                    data.insert(key, value);
                }
                StateChange::Delete { key } => {
                    diff.remove(key.clone());
                    data.remove(&key);
                }
            }
        }

        *version = new_version;
        self.history.write().push(diff);

        Ok(new_version)
    }
}

impl StateStore for MemoryStateStore {
    fn all_entries(&self) -> OrakelResult<Vec<StateEntry>> {
        Ok(self
            .data
            .read()
            .iter()
            .map(|(key, value)| StateEntry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    fn diff(&self, from_version: StateVersion) -> OrakelResult<StateDiff> {
        let history = self.history.read();
        let current_version = *self.version.read();

        let mut combined = StateDiff::new(from_version, current_version);

        for diff in history.iter().filter(|d| d.from_version >= from_version) {
            for (key, value) in &diff.added {
                combined.add(key.clone(), value.clone());
            }
            for key in &diff.removed {
                combined.remove(key.clone());
            }
        }

        Ok(combined)
    }
}

/// Thread-safe memory store wrapper
pub type SharedMemoryStateStore = Arc<MemoryStateStore>;

/// Create a shared memory state store
pub fn create_memory_store() -> SharedMemoryStateStore {
    Arc::new(MemoryStateStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_basic() {
        let store = MemoryStateStore::new();

        store.set(b"key1", b"value1").unwrap();
        assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));

        store.delete(b"key1").unwrap();
        assert_eq!(store.get(b"key1").unwrap(), None);
    }

    #[test]
    fn test_memory_store_batch() {
        let store = MemoryStateStore::new();

        let changes = vec![
            StateChange::Set {
                key: b"k1".to_vec(),
                value: b"v1".to_vec(),
            },
            StateChange::Set {
                key: b"k2".to_vec(),
                value: b"v2".to_vec(),
            },
            StateChange::Delete { key: b"k1".to_vec() },
        ];

        let version = store.apply_batch(changes).unwrap();
        assert_eq!(version.0, 1);

        assert!(!store.exists(b"k1").unwrap());
        assert!(store.exists(b"k2").unwrap());

        let diff = store.diff(StateVersion::new(0)).unwrap();
        assert!(diff.added.contains_key(&b"k2".to_vec()));
        assert_eq!(diff.removed, vec![b"k1".to_vec()]);
    }

    #[test]
    fn test_scan_prefix_is_ordered() {
        let store = MemoryStateStore::new();
        store.set(b"vote:b", b"2").unwrap();
        store.set(b"vote:a", b"1").unwrap();
        store.set(b"votf", b"x").unwrap();
        store.set(b"prevote:a", b"0").unwrap();

        let entries = store.scan_prefix(b"vote:").unwrap();
        let keys: Vec<_> = entries.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"vote:a".to_vec(), b"vote:b".to_vec()]);
    }
}
