//! Genesis configuration for the oracle

use orakel_core::{
    AccAddress, Denom, ExchangeRate, OracleParams, OrakelError, OrakelResult, ValAddress,
    VotingPower,
};
use orakel_state::StateStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::keeper::OracleKeeper;
use crate::msgs::check_denom;
use crate::staking::{ValidatorInfo, ValidatorSet};

/// Initial feeder delegation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDelegation {
    pub operator: ValAddress,
    pub delegate: AccAddress,
}

/// Rate known before the first tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisRate {
    pub denom: Denom,
    pub exchange_rate: ExchangeRate,
}

/// Genesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Chain ID
    pub chain_id: String,
    /// Oracle parameters
    #[serde(default)]
    pub params: OracleParams,
    /// Initial validator set
    pub validators: Vec<ValidatorInfo>,
    #[serde(default)]
    pub feeder_delegations: Vec<GenesisDelegation>,
    #[serde(default)]
    pub exchange_rates: Vec<GenesisRate>,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            chain_id: "orakel-1".to_string(),
            params: OracleParams::default(),
            validators: vec![],
            feeder_delegations: vec![],
            exchange_rates: vec![],
        }
    }
}

impl GenesisConfig {
    /// Single-machine development network with three validators
    pub fn devnet() -> Self {
        Self {
            chain_id: "orakel-devnet".to_string(),
            params: OracleParams {
                whitelist: vec![Denom::new("ukrw"), Denom::new("usdr"), Denom::new("uusd")],
                ..Default::default()
            },
            ..Default::default()
        }
        .add_validator("val1", 100)
        .add_validator("val2", 60)
        .add_validator("val3", 40)
    }

    /// Add a validator
    pub fn add_validator(mut self, address: &str, power: VotingPower) -> Self {
        self.validators
            .push(ValidatorInfo::new(ValAddress::new(address), power));
        self
    }

    /// Add a feeder delegation
    pub fn add_delegation(mut self, operator: &str, delegate: &str) -> Self {
        self.feeder_delegations.push(GenesisDelegation {
            operator: ValAddress::new(operator),
            delegate: AccAddress::new(delegate),
        });
        self
    }

    /// Add an initial rate
    pub fn add_rate(mut self, denom: &str, exchange_rate: ExchangeRate) -> Self {
        self.exchange_rates.push(GenesisRate {
            denom: Denom::new(denom),
            exchange_rate,
        });
        self
    }

    pub fn validate(&self) -> OrakelResult<()> {
        self.params.validate()?;
        if let Some(v) = self.validators.iter().find(|v| v.address.is_empty()) {
            return Err(OrakelError::ConfigError(format!(
                "validator with power {} has an empty address",
                v.power
            )));
        }
        for rate in &self.exchange_rates {
            check_denom(&rate.denom)
                .map_err(|e| OrakelError::ConfigError(format!("genesis rate: {}", e)))?;
        }
        Ok(())
    }

    /// Build the validator set described by this genesis
    pub fn validator_set(&self) -> ValidatorSet {
        ValidatorSet::with_validators(self.validators.clone())
    }

    /// Save to JSON
    pub fn to_json(&self) -> OrakelResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| OrakelError::SerializationError(e.to_string()))
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> OrakelResult<Self> {
        serde_json::from_str(json).map_err(|e| OrakelError::DeserializationError(e.to_string()))
    }
}

/// Initialize genesis state
pub struct GenesisInitializer<S: StateStore> {
    keeper: Arc<OracleKeeper<S>>,
    config: GenesisConfig,
}

impl<S: StateStore> GenesisInitializer<S> {
    pub fn new(keeper: Arc<OracleKeeper<S>>, config: GenesisConfig) -> Self {
        Self { keeper, config }
    }

    /// Write delegations and seed rates
    pub fn initialize(&self) -> OrakelResult<()> {
        self.config.validate()?;
        info!("Initializing oracle genesis for chain: {}", self.config.chain_id);

        for d in &self.config.feeder_delegations {
            self.keeper.set_feeder_delegate(&d.operator, &d.delegate)?;
            info!("Genesis feeder: {} -> {}", d.operator, d.delegate);
        }

        for r in &self.config.exchange_rates {
            self.keeper.set_rate(&r.denom, r.exchange_rate.clone())?;
            info!("Genesis rate: {} = {}", r.denom, r.exchange_rate);
        }

        info!(
            "Genesis complete: {} validators, {} delegations, {} rates",
            self.config.validators.len(),
            self.config.feeder_delegations.len(),
            self.config.exchange_rates.len()
        );

        Ok(())
    }
}
