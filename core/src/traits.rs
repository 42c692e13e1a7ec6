//! Core traits defining ORAKEL interfaces
//!
//! State transitions are synchronous: every replica applies the same ordered
//! transactions to completion within the block that carries them.

use crate::types::*;

/// Result type for ORAKEL operations
pub type OrakelResult<T> = Result<T, crate::error::OrakelError>;

/// Trait for hashable types
pub trait Hashable {
    /// Compute the hash of this object
    fn hash(&self) -> Hash;
}

/// Read side of the key-value state
pub trait StateProvider: Send + Sync {
    /// Get the current state version
    fn version(&self) -> StateVersion;

    /// Get a value by key
    fn get(&self, key: &[u8]) -> OrakelResult<Option<Vec<u8>>>;

    /// Check if a key exists
    fn exists(&self, key: &[u8]) -> OrakelResult<bool>;

    /// All entries whose key starts with `prefix`, in ascending key order
    fn scan_prefix(&self, prefix: &[u8]) -> OrakelResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Write side of the key-value state
pub trait StateMutator: StateProvider {
    /// Set a value
    fn set(&self, key: &[u8], value: &[u8]) -> OrakelResult<()>;

    /// Delete a key
    fn delete(&self, key: &[u8]) -> OrakelResult<()>;

    /// Apply a batch of changes atomically
    fn apply_batch(&self, changes: Vec<StateChange>) -> OrakelResult<StateVersion>;
}

/// State change operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Set { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Read access to validator voting power, owned by the staking collaborator
pub trait VotingPowerSource: Send + Sync {
    /// Power of a single validator, zero if unknown or inactive
    fn power_of(&self, validator: &ValAddress) -> VotingPower;

    /// Active validators with nonzero power, ordered by address
    fn active_validators(&self) -> Vec<(ValAddress, VotingPower)>;

    /// Sum of all active voting power
    fn total_power(&self) -> TotalPower {
        self.active_validators()
            .iter()
            .map(|(_, p)| *p as TotalPower)
            .sum()
    }
}
