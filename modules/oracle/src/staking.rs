//! Validator set with voting power
//!
//! Stands in for the staking module: the oracle only ever asks it for power.

use orakel_core::{ValAddress, VotingPower, VotingPowerSource};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Validator information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub address: ValAddress,
    pub power: VotingPower,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ValidatorInfo {
    pub fn new(address: ValAddress, power: VotingPower) -> Self {
        Self {
            address,
            power,
            active: true,
        }
    }
}

/// Validator set management
#[derive(Default)]
pub struct ValidatorSet {
    validators: RwLock<BTreeMap<ValAddress, ValidatorInfo>>,
}

impl ValidatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with initial validators
    pub fn with_validators(validators: Vec<ValidatorInfo>) -> Self {
        let set = Self::new();
        {
            let mut map = set.validators.write();
            for v in validators {
                map.insert(v.address.clone(), v);
            }
        }
        set
    }

    /// Add or replace a validator
    pub fn upsert(&self, info: ValidatorInfo) {
        self.validators.write().insert(info.address.clone(), info);
    }

    pub fn remove(&self, address: &ValAddress) -> Option<ValidatorInfo> {
        self.validators.write().remove(address)
    }

    /// Change a validator's power, returning false if it is unknown
    pub fn set_power(&self, address: &ValAddress, power: VotingPower) -> bool {
        match self.validators.write().get_mut(address) {
            Some(v) => {
                v.power = power;
                true
            }
            None => false,
        }
    }

    pub fn set_active(&self, address: &ValAddress, active: bool) -> bool {
        match self.validators.write().get_mut(address) {
            Some(v) => {
                v.active = active;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, address: &ValAddress) -> Option<ValidatorInfo> {
        self.validators.read().get(address).cloned()
    }

    /// All validators, active or not, ordered by address
    pub fn all(&self) -> Vec<ValidatorInfo> {
        self.validators.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.validators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.read().is_empty()
    }
}

impl VotingPowerSource for ValidatorSet {
    fn power_of(&self, validator: &ValAddress) -> VotingPower {
        self.validators
            .read()
            .get(validator)
            .filter(|v| v.active)
            .map(|v| v.power)
            .unwrap_or(0)
    }

    fn active_validators(&self) -> Vec<(ValAddress, VotingPower)> {
        self.validators
            .read()
            .values()
            .filter(|v| v.active && v.power > 0)
            .map(|v| (v.address.clone(), v.power))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_lookup() {
        let set = ValidatorSet::with_validators(vec![
            ValidatorInfo::new(ValAddress::new("V2"), 5),
            ValidatorInfo::new(ValAddress::new("V1"), 10),
            ValidatorInfo::new(ValAddress::new("V3"), 0),
        ]);

        assert_eq!(set.power_of(&ValAddress::new("V1")), 10);
        assert_eq!(set.power_of(&ValAddress::new("nobody")), 0);
        assert_eq!(set.total_power(), 15);

        let active: Vec<_> = set.active_validators().into_iter().map(|(a, _)| a).collect();
        assert_eq!(active, vec![ValAddress::new("V1"), ValAddress::new("V2")]);
    }

    #[test]
    fn test_inactive_has_no_power() {
        let set = ValidatorSet::with_validators(vec![ValidatorInfo::new(ValAddress::new("V1"), 10)]);
        assert!(set.set_active(&ValAddress::new("V1"), false));
        assert_eq!(set.power_of(&ValAddress::new("V1")), 0);
        assert_eq!(set.total_power(), 0);

        assert!(set.set_active(&ValAddress::new("V1"), true));
        assert!(set.set_power(&ValAddress::new("V1"), 3));
        assert_eq!(set.total_power(), 3);
    }
}
