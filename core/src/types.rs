//! Core types for ORAKEL
//!
//! Defines fundamental data structures used across the system.

use num_bigint::{BigInt, BigUint, Sign};
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Size of a prevote commitment (truncated SHA-256)
pub const VOTE_HASH_SIZE: usize = 20;

/// Fractional digits carried by an exchange rate
pub const DECIMAL_PRECISION: u32 = 18;

/// Bits needed to hold 10^18
pub const DECIMAL_PRECISION_BITS: u32 = 60;

/// Default upper bound on the bit length of a precision-scaled exchange rate
pub const MAX_EXCHANGE_RATE_BITS: u32 = 100 + DECIMAL_PRECISION_BITS;

/// Widest precision-scaled rate that parses at all
pub const MAX_DECIMAL_BITS: u32 = 255 + DECIMAL_PRECISION_BITS;

/// 32-byte hash type (state roots, transaction ids)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Hash(arr))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", &self.to_hex()[..16])
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash(0x{})", self.to_hex())
    }
}

/// Prevote commitment: SHA-256 of the reveal payload, truncated to 20 bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteHash(pub [u8; VOTE_HASH_SIZE]);

impl VoteHash {
    pub fn from_bytes(bytes: [u8; VOTE_HASH_SIZE]) -> Self {
        VoteHash(bytes)
    }

    /// Returns `None` unless the slice is exactly `VOTE_HASH_SIZE` long
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; VOTE_HASH_SIZE] = bytes.try_into().ok()?;
        Some(VoteHash(arr))
    }

    pub fn as_bytes(&self) -> &[u8; VOTE_HASH_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for VoteHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for VoteHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoteHash({})", self.to_hex())
    }
}

/// Validator (vote-signing) identity
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ValAddress(pub String);

impl ValAddress {
    pub fn new(s: impl Into<String>) -> Self {
        ValAddress(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The account that feeds for this validator when nothing is delegated
    pub fn to_account(&self) -> AccAddress {
        AccAddress(self.0.clone())
    }
}

impl fmt::Display for ValAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ValAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValAddress({})", self.0)
    }
}

/// Account identity (feeders, delegates, transaction signers)
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct AccAddress(pub String);

impl AccAddress {
    pub fn new(s: impl Into<String>) -> Self {
        AccAddress(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AccAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for AccAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccAddress({})", self.0)
    }
}

/// Longest denom accepted in a message, a whitelist or a genesis file
pub const MAX_DENOM_LEN: usize = 128;

/// Denomination the Luna rate is quoted in (e.g. `ukrw`)
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Denom(pub String);

impl Denom {
    pub fn new(s: impl Into<String>) -> Self {
        Denom(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Denom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Denom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Denom({})", self.0)
    }
}

/// Fixed-precision exchange rate of Luna in some denomination.
///
/// Held as an integer count of 10^-18 units, so any rate with at most
/// `DECIMAL_PRECISION` fractional digits is exact regardless of magnitude.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ExchangeRate {
    units: BigInt,
}

/// Why a string is not an exchange rate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateParseError {
    #[error("empty exchange rate")]
    Empty,

    #[error("invalid exchange rate {0:?}")]
    InvalidFormat(String),

    #[error("exchange rate {0} has more than 18 fractional digits")]
    TooPrecise(String),

    #[error("exchange rate needs more than {} bits", MAX_DECIMAL_BITS)]
    TooLarge,
}

impl ExchangeRate {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Rate from a raw count of 10^-18 units
    pub fn from_units(units: BigInt) -> Self {
        ExchangeRate { units }
    }

    pub fn units(&self) -> &BigInt {
        &self.units
    }

    pub fn is_negative(&self) -> bool {
        self.units.sign() == Sign::Minus
    }

    /// Bit length of the rate scaled to `DECIMAL_PRECISION` fractional digits
    pub fn bit_len(&self) -> u64 {
        self.units.bits()
    }

    /// Whether `self` is within `center * band` of `center`, compared exactly
    pub fn within_band(&self, center: &ExchangeRate, band: Decimal) -> bool {
        let band_scale = BigUint::from(10u32).pow(band.scale());
        let band_mantissa = BigUint::from(band.mantissa().unsigned_abs());
        let distance = (&self.units - &center.units).magnitude() * band_scale;
        distance <= center.units.magnitude() * band_mantissa
    }

    /// Canonical textual form used inside commitment hashes.
    ///
    /// Trailing zeros are stripped so `100`, `100.0` and `100.000` commit identically.
    pub fn canonical_string(&self) -> String {
        self.to_string()
    }
}

fn unit_scale() -> BigUint {
    BigUint::from(10u64.pow(DECIMAL_PRECISION))
}

impl FromStr for ExchangeRate {
    type Err = RateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RateParseError::Empty);
        }
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((int_part, frac_part)) if !frac_part.is_empty() => (int_part, frac_part),
            Some(_) => return Err(RateParseError::InvalidFormat(s.to_string())),
            None => (body, ""),
        };
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if int_part.is_empty() || !all_digits(int_part) || !all_digits(frac_part) {
            return Err(RateParseError::InvalidFormat(s.to_string()));
        }
        if frac_part.len() > DECIMAL_PRECISION as usize {
            return Err(RateParseError::TooPrecise(s.to_string()));
        }
        // Anything longer is far past `MAX_DECIMAL_BITS`
        if int_part.len() > 96 {
            return Err(RateParseError::TooLarge);
        }

        let digits = format!(
            "{}{:0<width$}",
            int_part,
            frac_part,
            width = DECIMAL_PRECISION as usize
        );
        let magnitude = BigUint::parse_bytes(digits.as_bytes(), 10)
            .ok_or_else(|| RateParseError::InvalidFormat(s.to_string()))?;
        if magnitude.bits() > MAX_DECIMAL_BITS as u64 {
            return Err(RateParseError::TooLarge);
        }

        let sign = if negative { Sign::Minus } else { Sign::Plus };
        Ok(ExchangeRate {
            units: BigInt::from_biguint(sign, magnitude),
        })
    }
}

/// Rounds to `DECIMAL_PRECISION` fractional digits first
impl From<Decimal> for ExchangeRate {
    fn from(value: Decimal) -> Self {
        let value = value.round_dp(DECIMAL_PRECISION);
        let factor = BigInt::from(10u32).pow(DECIMAL_PRECISION - value.scale());
        ExchangeRate {
            units: BigInt::from(value.mantissa()) * factor,
        }
    }
}

impl From<u64> for ExchangeRate {
    fn from(value: u64) -> Self {
        ExchangeRate {
            units: BigInt::from(value) * BigInt::from(unit_scale()),
        }
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = unit_scale();
        let magnitude = self.units.magnitude();
        let int_part = magnitude / &scale;
        let frac_part = (magnitude % &scale).to_string();

        if self.is_negative() {
            write!(f, "-")?;
        }
        write!(f, "{}", int_part)?;

        let padded = format!("{:0>width$}", frac_part, width = DECIMAL_PRECISION as usize);
        let trimmed = padded.trim_end_matches('0');
        if !trimmed.is_empty() {
            write!(f, ".{}", trimmed)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExchangeRate({})", self)
    }
}

impl Serialize for ExchangeRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ExchangeRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Block height
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    pub fn new(value: u64) -> Self {
        BlockHeight(value)
    }

    pub fn next(&self) -> BlockHeight {
        BlockHeight(self.0 + 1)
    }

    /// Voting period this height belongs to
    pub fn period(&self, vote_period: u64) -> Period {
        Period(self.0 / vote_period.max(1))
    }

    /// Whether this is the last block of its voting period
    pub fn ends_period(&self, vote_period: u64) -> bool {
        let vote_period = vote_period.max(1);
        (self.0 + 1) % vote_period == 0
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHeight({})", self.0)
    }
}

/// Voting period index
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Period(pub u64);

impl Period {
    pub fn new(value: u64) -> Self {
        Period(value)
    }

    pub fn next(&self) -> Period {
        Period(self.0 + 1)
    }

    /// The period before this one, if any
    pub fn previous(&self) -> Option<Period> {
        self.0.checked_sub(1).map(Period)
    }

    /// Slash window this period falls in
    pub fn window(&self, slash_window: u64) -> u64 {
        self.0 / slash_window.max(1)
    }

    /// Whether this is the last period of its slash window
    pub fn ends_window(&self, slash_window: u64) -> bool {
        let slash_window = slash_window.max(1);
        (self.0 + 1) % slash_window == 0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

impl fmt::Debug for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Period({})", self.0)
    }
}

/// Timestamp in milliseconds since Unix epoch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp_millis() as u64)
    }

    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// State version, bumped once per applied batch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct StateVersion(pub u64);

impl StateVersion {
    pub fn new(value: u64) -> Self {
        StateVersion(value)
    }

    pub fn next(&self) -> StateVersion {
        StateVersion(self.0 + 1)
    }
}

impl fmt::Display for StateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Debug for StateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateVersion({})", self.0)
    }
}

/// Transaction ID (hash of transaction content)
pub type TxId = Hash;

/// State root hash
pub type StateRoot = Hash;

/// Voting power of a validator
pub type VotingPower = u64;

/// Sum of many validators' `VotingPower`
pub type TotalPower = u128;
