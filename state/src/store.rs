//! Core state store traits and types

use orakel_core::{
    Hash, OrakelError, OrakelResult, StateChange, StateMutator, StateRoot, StateVersion,
};
use orakel_crypto::hashing::{hash, merkle_root};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State entry for merkle tree computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl StateEntry {
    pub fn hash(&self) -> Hash {
        let mut data = Vec::with_capacity(self.key.len() + self.value.len() + 8);
        data.extend_from_slice(&(self.key.len() as u64).to_le_bytes());
        data.extend_from_slice(&self.key);
        data.extend_from_slice(&self.value);
        hash(&data)
    }
}

/// Compute state root from entries
pub fn compute_state_root(entries: &[StateEntry]) -> StateRoot {
    if entries.is_empty() {
        return Hash::ZERO;
    }

    // Sort entries by key for deterministic ordering
    let mut sorted: Vec<_> = entries.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));

    let leaves: Vec<Hash> = sorted.iter().map(|e| e.hash()).collect();

    merkle_root(&leaves)
}

/// State diff for synchronization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDiff {
    pub from_version: StateVersion,
    pub to_version: StateVersion,
    pub added: BTreeMap<Vec<u8>, Vec<u8>>,
    pub removed: Vec<Vec<u8>>,
}

impl StateDiff {
    pub fn new(from_version: StateVersion, to_version: StateVersion) -> Self {
        Self {
            from_version,
            to_version,
            added: BTreeMap::new(),
            removed: Vec::new(),
        }
    }

    pub fn add(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.removed.retain(|k| k != &key);
        self.added.insert(key, value);
    }

    pub fn remove(&mut self, key: Vec<u8>) {
        self.added.remove(&key);
        self.removed.push(key);
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Abstract state store interface
pub trait StateStore: StateMutator {
    /// Get all entries for state root computation
    fn all_entries(&self) -> OrakelResult<Vec<StateEntry>>;

    /// Compute current state root
    fn compute_root(&self) -> OrakelResult<StateRoot> {
        let entries = self.all_entries()?;
        Ok(compute_state_root(&entries))
    }

    /// Get diff between versions
    fn diff(&self, from_version: StateVersion) -> OrakelResult<StateDiff>;
}

/// Encode a state value
pub fn encode_value<T: Serialize>(value: &T) -> OrakelResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| OrakelError::SerializationError(e.to_string()))
}

/// Decode a state value
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> OrakelResult<T> {
    bincode::deserialize(bytes).map_err(|e| OrakelError::DeserializationError(e.to_string()))
}

/// Width of the length header in front of every key segment
const SEGMENT_LEN_BYTES: usize = 4;

/// Build a key from a prefix and length-delimited segments.
///
/// Each segment is written as a big-endian u32 length followed by its bytes,
/// so no segment can bleed into the next. Message validation caps denoms and
/// addresses far below `u32::MAX`.
pub fn compose_key(prefix: &[u8], segments: &[&[u8]]) -> Vec<u8> {
    let len = prefix.len() + segments.iter().map(|s| s.len() + SEGMENT_LEN_BYTES).sum::<usize>();
    let mut key = Vec::with_capacity(len);
    key.extend_from_slice(prefix);
    for segment in segments {
        key.extend_from_slice(&(segment.len() as u32).to_be_bytes());
        key.extend_from_slice(segment);
    }
    key
}

/// Split a key built by [`compose_key`] back into its segments.
///
/// Returns `None` if the key does not start with `prefix` or is truncated.
pub fn decompose_key<'a>(prefix: &[u8], key: &'a [u8]) -> Option<Vec<&'a [u8]>> {
    let mut rest = key.strip_prefix(prefix)?;
    let mut segments = Vec::new();
    while !rest.is_empty() {
        let header: [u8; SEGMENT_LEN_BYTES] = rest.get(..SEGMENT_LEN_BYTES)?.try_into().ok()?;
        let len = u32::from_be_bytes(header) as usize;
        let tail = &rest[SEGMENT_LEN_BYTES..];
        let segment = tail.get(..len)?;
        segments.push(segment);
        rest = &tail[len..];
    }
    Some(segments)
}

/// Set-change helper for building batches
pub fn set_change<T: Serialize>(key: Vec<u8>, value: &T) -> OrakelResult<StateChange> {
    Ok(StateChange::Set {
        key,
        value: encode_value(value)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_roundtrip() {
        let value = (String::from("ukrw"), 42u64);
        let bytes = encode_value(&value).unwrap();
        let restored: (String, u64) = decode_value(&bytes).unwrap();
        assert_eq!(value, restored);
    }

    #[test]
    fn test_state_root_order_independent() {
        let a = StateEntry {
            key: b"key1".to_vec(),
            value: b"value1".to_vec(),
        };
        let b = StateEntry {
            key: b"key2".to_vec(),
            value: b"value2".to_vec(),
        };

        let root1 = compute_state_root(&[a.clone(), b.clone()]);
        let root2 = compute_state_root(&[b, a]);

        assert_eq!(root1, root2);
    }

    #[test]
    fn test_compose_key_segments_do_not_collide() {
        let k1 = compose_key(b"vote:", &[b"ab", b"c"]);
        let k2 = compose_key(b"vote:", &[b"a", b"bc"]);
        assert_ne!(k1, k2);
        assert!(k1.starts_with(b"vote:"));
    }

    #[test]
    fn test_long_segment_keeps_its_length() {
        let long = vec![b'u'; u16::MAX as usize + 10];
        let key = compose_key(b"rate:", &[&long, b"V1"]);
        let segments = decompose_key(b"rate:", &key).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].len(), long.len());
        assert_eq!(segments[1], &b"V1"[..]);
    }

    #[test]
    fn test_decompose_key() {
        let key = compose_key(b"report:", &[&7u64.to_be_bytes(), b"V1"]);
        let segments = decompose_key(b"report:", &key).unwrap();
        assert_eq!(segments, vec![&7u64.to_be_bytes()[..], &b"V1"[..]]);

        assert!(decompose_key(b"vote:", &key).is_none());
        assert!(decompose_key(b"report:", &key[..key.len() - 1]).is_none());
    }

    #[test]
    fn test_diff_add_then_remove() {
        let mut diff = StateDiff::new(StateVersion::new(0), StateVersion::new(1));
        diff.add(b"k".to_vec(), b"v".to_vec());
        diff.remove(b"k".to_vec());
        assert!(diff.added.is_empty());
        assert_eq!(diff.removed, vec![b"k".to_vec()]);
    }
}
