//! Oracle messages and their stateless checks

use orakel_core::{
    AccAddress, Denom, ExchangeRate, Hash, Hashable, OracleParams, OrakelError, OrakelResult,
    ValAddress, VoteHash, MAX_DENOM_LEN, VOTE_HASH_SIZE,
};
use orakel_crypto::hashing::{hash, vote_hash};
use serde::{Deserialize, Serialize};

/// Longest salt a vote may carry
pub const MAX_SALT_LEN: usize = 4;

/// Longest feeder or validator address accepted in a message
pub const MAX_ADDRESS_LEN: usize = 256;

/// Commitment to an exchange rate, revealed one period later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgExchangeRatePrevote {
    /// Hex of the truncated SHA-256 commitment
    pub hash: String,
    pub denom: Denom,
    pub feeder: AccAddress,
    pub validator: ValAddress,
}

impl MsgExchangeRatePrevote {
    pub fn new(hash: VoteHash, denom: Denom, feeder: AccAddress, validator: ValAddress) -> Self {
        Self {
            hash: hash.to_hex(),
            denom,
            feeder,
            validator,
        }
    }

    /// Build the prevote that the given vote will later reveal
    pub fn for_vote(vote: &MsgExchangeRateVote) -> Self {
        Self::new(
            vote.generate_hash(),
            vote.denom.clone(),
            vote.feeder.clone(),
            vote.validator.clone(),
        )
    }

    /// Decode the commitment, checking its length
    pub fn vote_hash(&self) -> OrakelResult<VoteHash> {
        let bytes = hex::decode(&self.hash).map_err(|e| OrakelError::InvalidHash(e.to_string()))?;
        VoteHash::from_slice(&bytes).ok_or(OrakelError::InvalidHashLength {
            expected: VOTE_HASH_SIZE,
            got: bytes.len(),
        })
    }

    pub fn validate_basic(&self) -> OrakelResult<VoteHash> {
        let hash = self.vote_hash()?;
        check_denom(&self.denom)?;
        check_addresses(&self.feeder, &self.validator)?;
        Ok(hash)
    }
}

/// Reveal of a previously committed exchange rate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgExchangeRateVote {
    pub exchange_rate: ExchangeRate,
    pub salt: String,
    pub denom: Denom,
    pub feeder: AccAddress,
    pub validator: ValAddress,
}

impl MsgExchangeRateVote {
    pub fn new(
        exchange_rate: ExchangeRate,
        salt: impl Into<String>,
        denom: Denom,
        feeder: AccAddress,
        validator: ValAddress,
    ) -> Self {
        Self {
            exchange_rate,
            salt: salt.into(),
            denom,
            feeder,
            validator,
        }
    }

    /// Commitment this reveal must match
    pub fn generate_hash(&self) -> VoteHash {
        vote_hash(&self.salt, &self.exchange_rate, &self.denom, &self.feeder)
    }

    pub fn validate_basic(&self, params: &OracleParams) -> OrakelResult<()> {
        check_denom(&self.denom)?;
        check_addresses(&self.feeder, &self.validator)?;
        check_rate(&self.exchange_rate, params.max_exchange_rate_bits)?;

        let salt_len = self.salt.len();
        if salt_len == 0 || salt_len > MAX_SALT_LEN {
            return Err(OrakelError::InvalidSaltLength(salt_len));
        }
        Ok(())
    }
}

/// Hand a validator's feeding rights to another account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDelegateFeedConsent {
    pub operator: ValAddress,
    pub delegate: AccAddress,
}

impl MsgDelegateFeedConsent {
    pub fn new(operator: ValAddress, delegate: AccAddress) -> Self {
        Self { operator, delegate }
    }

    pub fn validate_basic(&self) -> OrakelResult<()> {
        check_address("operator", self.operator.as_str())?;
        check_address("delegate", self.delegate.as_str())
    }
}

/// Denoms become store key segments, so their length is capped
pub fn check_denom(denom: &Denom) -> OrakelResult<()> {
    if denom.is_empty() {
        return Err(OrakelError::UnknownDenom);
    }
    if denom.as_str().len() > MAX_DENOM_LEN {
        return Err(OrakelError::InvalidDenom(format!(
            "{} bytes, limit is {}",
            denom.as_str().len(),
            MAX_DENOM_LEN
        )));
    }
    Ok(())
}

fn check_address(role: &str, address: &str) -> OrakelResult<()> {
    if address.is_empty() {
        return Err(OrakelError::InvalidAddress(format!("empty {}", role)));
    }
    if address.len() > MAX_ADDRESS_LEN {
        return Err(OrakelError::InvalidAddress(format!(
            "{} is {} bytes, limit is {}",
            role,
            address.len(),
            MAX_ADDRESS_LEN
        )));
    }
    Ok(())
}

fn check_addresses(feeder: &AccAddress, validator: &ValAddress) -> OrakelResult<()> {
    check_address("feeder", feeder.as_str())?;
    check_address("validator", validator.as_str())
}

fn check_rate(rate: &ExchangeRate, max_bits: u32) -> OrakelResult<()> {
    if rate.is_negative() {
        return Err(OrakelError::InvalidExchangeRateMagnitude(format!(
            "{} is negative",
            rate
        )));
    }
    let bits = rate.bit_len();
    if bits > max_bits as u64 {
        return Err(OrakelError::InvalidExchangeRateMagnitude(format!(
            "{} needs {} bits, limit is {}",
            rate, bits, max_bits
        )));
    }
    Ok(())
}

/// Every message the oracle module accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OracleMsg {
    Prevote(MsgExchangeRatePrevote),
    Vote(MsgExchangeRateVote),
    DelegateFeedConsent(MsgDelegateFeedConsent),
}

impl OracleMsg {
    /// Account that must sign this message
    pub fn expected_signer(&self) -> AccAddress {
        match self {
            OracleMsg::Prevote(m) => m.feeder.clone(),
            OracleMsg::Vote(m) => m.feeder.clone(),
            OracleMsg::DelegateFeedConsent(m) => m.operator.to_account(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OracleMsg::Prevote(_) => "prevote",
            OracleMsg::Vote(_) => "vote",
            OracleMsg::DelegateFeedConsent(_) => "delegate_feed_consent",
        }
    }
}

/// A message together with the account whose signature was verified upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMsg {
    pub signer: AccAddress,
    pub msg: OracleMsg,
}

impl SignedMsg {
    pub fn new(signer: AccAddress, msg: OracleMsg) -> Self {
        Self { signer, msg }
    }

    /// Wrap a message signed by its expected signer
    pub fn by_expected(msg: OracleMsg) -> Self {
        Self {
            signer: msg.expected_signer(),
            msg,
        }
    }

    pub fn check_signer(&self) -> OrakelResult<()> {
        let expected = self.msg.expected_signer();
        if self.signer != expected {
            return Err(OrakelError::SignerMismatch {
                expected: expected.to_string(),
                got: self.signer.to_string(),
            });
        }
        Ok(())
    }
}

impl Hashable for SignedMsg {
    fn hash(&self) -> Hash {
        // serde_json of these types cannot fail
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hash(&bytes)
    }
}
