//! State snapshot functionality

use orakel_core::{OrakelError, OrakelResult, StateRoot, StateVersion, Timestamp};
use serde::{Deserialize, Serialize};

use crate::memory::MemoryStateStore;
use crate::store::{compute_state_root, StateEntry, StateStore};

/// A complete state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Version at time of snapshot
    pub version: StateVersion,
    /// State root hash
    pub root: StateRoot,
    /// All state entries
    pub entries: Vec<StateEntry>,
    /// Timestamp of snapshot creation
    pub timestamp: Timestamp,
}

impl StateSnapshot {
    /// Create a new snapshot from entries
    pub fn new(version: StateVersion, entries: Vec<StateEntry>) -> Self {
        let root = compute_state_root(&entries);
        Self {
            version,
            root,
            entries,
            timestamp: Timestamp::now(),
        }
    }

    /// Capture any store
    pub fn capture<S: StateStore + ?Sized>(store: &S) -> OrakelResult<Self> {
        Ok(Self::new(store.version(), store.all_entries()?))
    }

    /// Verify snapshot integrity
    pub fn verify(&self) -> bool {
        compute_state_root(&self.entries) == self.root
    }

    /// Restore snapshot to a memory store
    pub fn restore(&self) -> MemoryStateStore {
        let data: Vec<(Vec<u8>, Vec<u8>)> = self
            .entries
            .iter()
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect();
        MemoryStateStore::with_data(data)
    }

    /// Serialize snapshot to bytes
    pub fn to_bytes(&self) -> OrakelResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| OrakelError::SerializationError(e.to_string()))
    }

    /// Deserialize snapshot from bytes
    pub fn from_bytes(bytes: &[u8]) -> OrakelResult<Self> {
        bincode::deserialize(bytes).map_err(|e| OrakelError::DeserializationError(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orakel_core::StateMutator;

    #[test]
    fn test_snapshot_restore() {
        let store = MemoryStateStore::new();
        store.set(b"rate:ukrw", b"100").unwrap();
        store.set(b"rate:uusd", b"1").unwrap();

        let snapshot = StateSnapshot::capture(&store).unwrap();
        assert!(snapshot.verify());
        assert_eq!(snapshot.len(), 2);

        let bytes = snapshot.to_bytes().unwrap();
        let restored = StateSnapshot::from_bytes(&bytes).unwrap().restore();

        assert_eq!(restored.compute_root().unwrap(), store.compute_root().unwrap());
    }

    #[test]
    fn test_tampered_snapshot_fails_verify() {
        let mut snapshot = StateSnapshot::new(
            StateVersion::new(1),
            vec![StateEntry {
                key: b"k".to_vec(),
                value: b"v".to_vec(),
            }],
        );
        snapshot.entries[0].value = b"w".to_vec();
        assert!(!snapshot.verify());
    }
}
