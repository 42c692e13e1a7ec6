//! Error types for ORAKEL

use thiserror::Error;

/// Main error type for ORAKEL
#[derive(Error, Debug)]
pub enum OrakelError {
    // ============ Message Validation Errors ============
    #[error("Invalid hash length: expected {expected} bytes, got {got}")]
    InvalidHashLength { expected: usize, got: usize },

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Unknown denom")]
    UnknownDenom,

    #[error("Invalid denom: {0}")]
    InvalidDenom(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid exchange rate: {0}")]
    InvalidExchangeRateMagnitude(String),

    #[error("Invalid salt length: {0}")]
    InvalidSaltLength(usize),

    // ============ Oracle Protocol Errors ============
    #[error("Feeder {feeder} has no voting permission for validator {validator}")]
    NoVotingPermission { feeder: String, validator: String },

    #[error("Validator not found: {0}")]
    ValidatorNotFound(String),

    #[error("Vote verification failed: {0}")]
    VerificationFailed(String),

    #[error("Validator {validator} already voted on {denom} this period")]
    AlreadyVoted { denom: String, validator: String },

    #[error("Signer mismatch: expected {expected}, got {got}")]
    SignerMismatch { expected: String, got: String },

    #[error("Period {0} was already tallied")]
    PeriodAlreadyTallied(u64),

    // ============ State Errors ============
    #[error("State not found for key")]
    StateNotFound,

    #[error("State corruption detected: {0}")]
    StateCorruption(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    // ============ Serialization Errors ============
    #[error("Message serialization failed: {0}")]
    SerializationError(String),

    #[error("Message deserialization failed: {0}")]
    DeserializationError(String),

    // ============ Node Errors ============
    #[error("Mempool rejected transaction: {0}")]
    MempoolRejected(String),

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ============ General Errors ============
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrakelError {
    /// Stable machine-readable kind, reported in transaction receipts
    pub fn kind(&self) -> &'static str {
        match self {
            OrakelError::InvalidHashLength { .. } => "invalid_hash_length",
            OrakelError::InvalidHash(_) => "invalid_hash",
            OrakelError::UnknownDenom => "unknown_denom",
            OrakelError::InvalidDenom(_) => "invalid_denom",
            OrakelError::InvalidAddress(_) => "invalid_address",
            OrakelError::InvalidExchangeRateMagnitude(_) => "invalid_exchange_rate",
            OrakelError::InvalidSaltLength(_) => "invalid_salt_length",
            OrakelError::NoVotingPermission { .. } => "no_voting_permission",
            OrakelError::ValidatorNotFound(_) => "validator_not_found",
            OrakelError::VerificationFailed(_) => "verification_failed",
            OrakelError::AlreadyVoted { .. } => "already_voted",
            OrakelError::SignerMismatch { .. } => "signer_mismatch",
            OrakelError::PeriodAlreadyTallied(_) => "period_already_tallied",
            OrakelError::StateNotFound => "state_not_found",
            OrakelError::StateCorruption(_) => "state_corruption",
            OrakelError::StorageError(_) => "storage_error",
            OrakelError::SerializationError(_) => "serialization_error",
            OrakelError::DeserializationError(_) => "deserialization_error",
            OrakelError::MempoolRejected(_) => "mempool_rejected",
            OrakelError::ConfigError(_) => "config_error",
            OrakelError::Internal(_) | OrakelError::Other(_) => "internal",
        }
    }
}

impl From<std::io::Error> for OrakelError {
    fn from(err: std::io::Error) -> Self {
        OrakelError::StorageError(err.to_string())
    }
}

impl From<bincode::Error> for OrakelError {
    fn from(err: bincode::Error) -> Self {
        OrakelError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for OrakelError {
    fn from(err: serde_json::Error) -> Self {
        OrakelError::SerializationError(err.to_string())
    }
}
