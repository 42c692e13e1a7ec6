//! Persistent state store using sled database

use orakel_core::{
    OrakelError, OrakelResult, StateChange, StateMutator, StateProvider, StateVersion,
};
use parking_lot::RwLock;
use sled::{Db, Tree};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::memory::MemoryStateStore;
use crate::store::{StateDiff, StateEntry, StateStore};

const STATE_TREE: &str = "state";
const META_TREE: &str = "meta";
const HISTORY_TREE: &str = "history";
const VERSION_KEY: &[u8] = b"version";

fn storage_err(e: sled::Error) -> OrakelError {
    OrakelError::StorageError(e.to_string())
}

/// Persistent state store backed by sled database
pub struct PersistentStateStore {
    db: Db,
    state: Tree,
    meta: Tree,
    history: Tree,
    version: RwLock<StateVersion>,
}

impl PersistentStateStore {
    pub fn open<P: AsRef<Path>>(path: P) -> OrakelResult<Self> {
        let db = sled::open(path).map_err(storage_err)?;

        let state = db.open_tree(STATE_TREE).map_err(storage_err)?;
        let meta = db.open_tree(META_TREE).map_err(storage_err)?;
        let history = db.open_tree(HISTORY_TREE).map_err(storage_err)?;

        // Load version from disk or start at 0
        let version = match meta.get(VERSION_KEY).map_err(storage_err)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    OrakelError::StateCorruption("version record is not 8 bytes".into())
                })?;
                StateVersion::new(u64::from_le_bytes(raw))
            }
            None => StateVersion::new(0),
        };

        debug!("Opened sled state at version {}", version);

        Ok(Self {
            db,
            state,
            meta,
            history,
            version: RwLock::new(version),
        })
    }

    /// Copy the current state into a memory store
    pub fn snapshot(&self) -> OrakelResult<MemoryStateStore> {
        let data: Vec<(Vec<u8>, Vec<u8>)> = self
            .all_entries()?
            .into_iter()
            .map(|e| (e.key, e.value))
            .collect();
        Ok(MemoryStateStore::with_data(data))
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> OrakelResult<()> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }

    /// Number of stored keys
    pub fn size_estimate(&self) -> u64 {
        self.state.len() as u64
    }
}

impl StateProvider for PersistentStateStore {
    fn version(&self) -> StateVersion {
        *self.version.read()
    }

    fn get(&self, key: &[u8]) -> OrakelResult<Option<Vec<u8>>> {
        self.state
            .get(key)
            .map(|opt| opt.map(|v| v.to_vec()))
            .map_err(storage_err)
    }

    fn exists(&self, key: &[u8]) -> OrakelResult<bool> {
        self.state.contains_key(key).map_err(storage_err)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> OrakelResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.state
            .scan_prefix(prefix)
            .map(|result| result.map(|(k, v)| (k.to_vec(), v.to_vec())))
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)
    }
}

impl StateMutator for PersistentStateStore {
    fn set(&self, key: &[u8], value: &[u8]) -> OrakelResult<()> {
        self.state.insert(key, value).map_err(storage_err)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> OrakelResult<()> {
        self.state.remove(key).map_err(storage_err)?;
        Ok(())
    }

    fn apply_batch(&self, changes: Vec<StateChange>) -> OrakelResult<StateVersion> {
        let mut version = self.version.write();
        let old_version = *version;
        let new_version = old_version.next();

        // Create a batch for atomic writes
        let mut batch = sled::Batch::default();
        let mut diff = StateDiff::new(old_version, new_version);

        for change in changes {
            match change {
                StateChange::Set { key, value } => {
                    batch.insert(key.as_slice(), value.as_slice());
                    diff.add(key, value);
                }
                StateChange::Delete { key } => {
                    batch.remove(key.as_slice());
                    diff.remove(key);
                }
            }
        }

        self.state.apply_batch(batch).map_err(storage_err)?;

        self.meta
            .insert(VERSION_KEY, &new_version.0.to_le_bytes()[..])
            .map_err(storage_err)?;

        // Big-endian so history keys iterate in version order
        let diff_bytes = serde_json::to_vec(&diff)?;
        self.history
            .insert(old_version.0.to_be_bytes(), diff_bytes)
            .map_err(storage_err)?;

        self.db.flush().map_err(storage_err)?;

        *version = new_version;

        Ok(new_version)
    }
}

impl StateStore for PersistentStateStore {
    fn all_entries(&self) -> OrakelResult<Vec<StateEntry>> {
        self.state
            .iter()
            .map(|result| {
                result.map(|(key, value)| StateEntry {
                    key: key.to_vec(),
                    value: value.to_vec(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)
    }

    fn diff(&self, from_version: StateVersion) -> OrakelResult<StateDiff> {
        let current_version = *self.version.read();
        let mut combined = StateDiff::new(from_version, current_version);

        for result in self.history.range(from_version.0.to_be_bytes()..) {
            let (_, diff_bytes) = result.map_err(storage_err)?;
            let d: StateDiff = serde_json::from_slice(&diff_bytes)?;

            for (key, value) in d.added {
                combined.add(key, value);
            }
            for key in d.removed {
                combined.remove(key);
            }
        }

        Ok(combined)
    }
}

/// Thread-safe persistent store wrapper
pub type SharedPersistentStateStore = Arc<PersistentStateStore>;

/// Create a shared persistent state store
pub fn create_persistent_store<P: AsRef<Path>>(path: P) -> OrakelResult<SharedPersistentStateStore> {
    Ok(Arc::new(PersistentStateStore::open(path)?))
}
