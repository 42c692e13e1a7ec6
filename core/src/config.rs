//! Configuration types for ORAKEL

use crate::error::OrakelError;
use crate::traits::OrakelResult;
use crate::types::{Denom, MAX_DENOM_LEN, MAX_EXCHANGE_RATE_BITS};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name for logging
    pub name: String,

    /// Data directory
    pub data_dir: PathBuf,

    /// State backend
    pub storage: StorageBackend,

    /// Block interval in milliseconds
    pub block_time_ms: u64,

    /// Mempool configuration
    pub mempool: MempoolConfig,

    /// API configuration
    pub api: ApiConfig,

    /// Logging level (an `EnvFilter` directive)
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "orakel-node".to_string(),
            data_dir: PathBuf::from("./data"),
            storage: StorageBackend::Memory,
            block_time_ms: 1000,
            mempool: MempoolConfig::default(),
            api: ApiConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load from a JSON file
    pub fn from_json(json: &str) -> OrakelResult<Self> {
        serde_json::from_str(json).map_err(|e| OrakelError::ConfigError(e.to_string()))
    }
}

/// Where state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sled,
}

/// Mempool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolConfig {
    /// Maximum pending transactions
    pub max_size: usize,

    /// Maximum pending transactions per signer
    pub max_per_signer: usize,

    /// Maximum transactions delivered per block
    pub max_block_txs: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            max_per_signer: 64,
            max_block_txs: 500,
        }
    }
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    pub enabled: bool,

    /// API listen address
    pub listen_addr: String,

    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:8080".to_string(),
            enable_cors: true,
        }
    }
}

/// Oracle module parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleParams {
    /// Blocks per voting period
    pub vote_period: u64,

    /// Fraction of total active power a ballot needs to publish a rate
    pub vote_threshold: Decimal,

    /// Votes further than `median * trim_band` from the median are trimmed
    pub trim_band: Decimal,

    /// Periods per participation window
    pub slash_window: u64,

    /// Closed participation windows kept for queries
    pub retained_windows: u64,

    /// Bit length bound on precision-scaled exchange rates
    pub max_exchange_rate_bits: u32,

    /// Denominations every validator is expected to vote on each period
    #[serde(default)]
    pub whitelist: Vec<Denom>,
}

impl Default for OracleParams {
    fn default() -> Self {
        Self {
            vote_period: 5,
            vote_threshold: Decimal::new(5, 1), // 50%
            trim_band: Decimal::new(1, 2),      // 1%
            slash_window: 100,
            retained_windows: 4,
            max_exchange_rate_bits: MAX_EXCHANGE_RATE_BITS,
            whitelist: vec![],
        }
    }
}

impl OracleParams {
    /// Reject parameter sets the tally cannot run with
    pub fn validate(&self) -> OrakelResult<()> {
        if self.vote_period == 0 {
            return Err(OrakelError::ConfigError("vote_period must be positive".into()));
        }
        if self.slash_window == 0 {
            return Err(OrakelError::ConfigError("slash_window must be positive".into()));
        }
        if self.vote_threshold <= Decimal::ZERO || self.vote_threshold > Decimal::ONE {
            return Err(OrakelError::ConfigError(format!(
                "vote_threshold must be in (0, 1], got {}",
                self.vote_threshold
            )));
        }
        if self.trim_band.is_sign_negative() {
            return Err(OrakelError::ConfigError(format!(
                "trim_band must not be negative, got {}",
                self.trim_band
            )));
        }
        if self.max_exchange_rate_bits == 0 {
            return Err(OrakelError::ConfigError(
                "max_exchange_rate_bits must be positive".into(),
            ));
        }
        if self.whitelist.iter().any(|d| d.is_empty()) {
            return Err(OrakelError::ConfigError("whitelist contains an empty denom".into()));
        }
        if let Some(d) = self.whitelist.iter().find(|d| d.as_str().len() > MAX_DENOM_LEN) {
            return Err(OrakelError::ConfigError(format!(
                "whitelist denom of {} bytes exceeds {}",
                d.as_str().len(),
                MAX_DENOM_LEN
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_valid() {
        assert!(OracleParams::default().validate().is_ok());
    }

    #[test]
    fn test_whitelist_denom_length_capped() {
        let params = OracleParams {
            whitelist: vec![Denom::new("u".repeat(MAX_DENOM_LEN + 1))],
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(OrakelError::ConfigError(_))));
    }

    #[test]
    fn test_params_rejections() {
        let zero_period = OracleParams {
            vote_period: 0,
            ..Default::default()
        };
        assert!(matches!(zero_period.validate(), Err(OrakelError::ConfigError(_))));

        let bad_threshold = OracleParams {
            vote_threshold: Decimal::new(15, 1),
            ..Default::default()
        };
        assert!(bad_threshold.validate().is_err());

        let empty_denom = OracleParams {
            whitelist: vec![Denom::new("")],
            ..Default::default()
        };
        assert!(empty_denom.validate().is_err());
    }

    #[test]
    fn test_node_config_json() {
        let json = serde_json::to_string(&NodeConfig::default()).unwrap();
        let restored = NodeConfig::from_json(&json).unwrap();
        assert_eq!(restored.storage, StorageBackend::Memory);
        assert_eq!(restored.api.listen_addr, "127.0.0.1:8080");
    }
}
