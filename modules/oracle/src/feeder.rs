//! Feeder delegation registry

use orakel_core::{AccAddress, OrakelError, OrakelResult, StateChange, ValAddress};
use orakel_state::{compose_key, decode_value, set_change, StateStore};
use std::sync::Arc;

const FEEDER_PREFIX: &[u8] = b"feeder:";

pub fn feeder_key(operator: &ValAddress) -> Vec<u8> {
    compose_key(FEEDER_PREFIX, &[operator.as_str().as_bytes()])
}

/// Maps a validator to the account allowed to feed prices for it
pub struct FeederRegistry<S: StateStore> {
    state: Arc<S>,
}

impl<S: StateStore> FeederRegistry<S> {
    pub fn new(state: Arc<S>) -> Self {
        Self { state }
    }

    /// Overwrite the delegate for `operator`
    pub fn set_delegate(&self, operator: &ValAddress, delegate: &AccAddress) -> OrakelResult<()> {
        let change = self.delegate_change(operator, delegate)?;
        self.state.apply_batch(vec![change])?;
        Ok(())
    }

    /// Batch entry for a delegation, validated but not yet written
    pub fn delegate_change(
        &self,
        operator: &ValAddress,
        delegate: &AccAddress,
    ) -> OrakelResult<StateChange> {
        if operator.is_empty() {
            return Err(OrakelError::InvalidAddress("empty operator".into()));
        }
        if delegate.is_empty() {
            return Err(OrakelError::InvalidAddress("empty delegate".into()));
        }
        set_change(feeder_key(operator), delegate)
    }

    /// The explicit delegate, if one was set
    pub fn get_delegate(&self, operator: &ValAddress) -> OrakelResult<Option<AccAddress>> {
        self.state
            .get(&feeder_key(operator))?
            .map(|bytes| decode_value(&bytes))
            .transpose()
    }

    /// Account that may feed for `operator`: its delegate, or the operator itself
    pub fn resolve_feeder(&self, operator: &ValAddress) -> OrakelResult<AccAddress> {
        Ok(self
            .get_delegate(operator)?
            .unwrap_or_else(|| operator.to_account()))
    }

    /// Whether `feeder` may submit for `operator`
    pub fn is_authorized(&self, feeder: &AccAddress, operator: &ValAddress) -> OrakelResult<bool> {
        Ok(&self.resolve_feeder(operator)? == feeder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orakel_state::MemoryStateStore;

    #[test]
    fn test_default_feeder_is_operator() {
        let registry = FeederRegistry::new(Arc::new(MemoryStateStore::new()));
        let v1 = ValAddress::new("V1");
        assert_eq!(registry.resolve_feeder(&v1).unwrap(), AccAddress::new("V1"));
        assert!(registry.get_delegate(&v1).unwrap().is_none());
    }

    #[test]
    fn test_delegation_is_total_override() {
        let registry = FeederRegistry::new(Arc::new(MemoryStateStore::new()));
        let v1 = ValAddress::new("V1");

        registry.set_delegate(&v1, &AccAddress::new("F1")).unwrap();
        assert!(registry.is_authorized(&AccAddress::new("F1"), &v1).unwrap());
        assert!(!registry.is_authorized(&AccAddress::new("V1"), &v1).unwrap());

        registry.set_delegate(&v1, &AccAddress::new("F2")).unwrap();
        assert!(!registry.is_authorized(&AccAddress::new("F1"), &v1).unwrap());
        assert_eq!(registry.resolve_feeder(&v1).unwrap(), AccAddress::new("F2"));
    }

    #[test]
    fn test_empty_identities_rejected() {
        let registry = FeederRegistry::new(Arc::new(MemoryStateStore::new()));
        assert!(matches!(
            registry.set_delegate(&ValAddress::new(""), &AccAddress::new("F1")),
            Err(OrakelError::InvalidAddress(_))
        ));
        assert!(matches!(
            registry.set_delegate(&ValAddress::new("V1"), &AccAddress::new("")),
            Err(OrakelError::InvalidAddress(_))
        ));
    }
}
