//! State backend chosen at startup

use orakel_core::{
    NodeConfig, OrakelResult, StateChange, StateMutator, StateProvider, StateVersion,
    StorageBackend,
};
use orakel_state::{MemoryStateStore, PersistentStateStore, StateDiff, StateEntry, StateStore};
use tracing::info;

/// Either backend, behind one concrete type the keeper can be generic over
pub enum NodeStore {
    Memory(MemoryStateStore),
    Sled(PersistentStateStore),
}

impl NodeStore {
    pub fn open(config: &NodeConfig) -> OrakelResult<Self> {
        match config.storage {
            StorageBackend::Memory => {
                info!("Using in-memory state");
                Ok(NodeStore::Memory(MemoryStateStore::new()))
            }
            StorageBackend::Sled => {
                let path = config.data_dir.join("state");
                info!("Using sled state at {}", path.display());
                Ok(NodeStore::Sled(PersistentStateStore::open(path)?))
            }
        }
    }

    pub fn backend(&self) -> StorageBackend {
        match self {
            NodeStore::Memory(_) => StorageBackend::Memory,
            NodeStore::Sled(_) => StorageBackend::Sled,
        }
    }
}

impl StateProvider for NodeStore {
    fn version(&self) -> StateVersion {
        match self {
            NodeStore::Memory(s) => s.version(),
            NodeStore::Sled(s) => s.version(),
        }
    }

    fn get(&self, key: &[u8]) -> OrakelResult<Option<Vec<u8>>> {
        match self {
            NodeStore::Memory(s) => s.get(key),
            NodeStore::Sled(s) => s.get(key),
        }
    }

    fn exists(&self, key: &[u8]) -> OrakelResult<bool> {
        match self {
            NodeStore::Memory(s) => s.exists(key),
            NodeStore::Sled(s) => s.exists(key),
        }
    }

    fn scan_prefix(&self, prefix: &[u8]) -> OrakelResult<Vec<(Vec<u8>, Vec<u8>)>> {
        match self {
            NodeStore::Memory(s) => s.scan_prefix(prefix),
            NodeStore::Sled(s) => s.scan_prefix(prefix),
        }
    }
}

impl StateMutator for NodeStore {
    fn set(&self, key: &[u8], value: &[u8]) -> OrakelResult<()> {
        match self {
            NodeStore::Memory(s) => s.set(key, value),
            NodeStore::Sled(s) => s.set(key, value),
        }
    }

    fn delete(&self, key: &[u8]) -> OrakelResult<()> {
        match self {
            NodeStore::Memory(s) => s.delete(key),
            NodeStore::Sled(s) => s.delete(key),
        }
    }

    fn apply_batch(&self, changes: Vec<StateChange>) -> OrakelResult<StateVersion> {
        match self {
            NodeStore::Memory(s) => s.apply_batch(changes),
            NodeStore::Sled(s) => s.apply_batch(changes),
        }
    }
}

impl StateStore for NodeStore {
    fn all_entries(&self) -> OrakelResult<Vec<StateEntry>> {
        match self {
            NodeStore::Memory(s) => s.all_entries(),
            NodeStore::Sled(s) => s.all_entries(),
        }
    }

    fn diff(&self, from_version: StateVersion) -> OrakelResult<StateDiff> {
        match self {
            NodeStore::Memory(s) => s.diff(from_version),
            NodeStore::Sled(s) => s.diff(from_version),
        }
    }
}
