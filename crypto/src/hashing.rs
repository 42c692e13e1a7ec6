//! Hashing functions: BLAKE3 for state, truncated SHA-256 for vote commitments

use orakel_core::{AccAddress, Denom, ExchangeRate, Hash, VoteHash, VOTE_HASH_SIZE};
use sha2::{Digest, Sha256};

/// Compute BLAKE3 hash of data
pub fn blake3_hash(data: &[u8]) -> Hash {
    let hash = blake3::hash(data);
    Hash::from_bytes(*hash.as_bytes())
}

/// Compute SHA-256 hash of data
pub fn sha256_hash(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Hash::from_bytes(bytes)
}

/// SHA-256 truncated to the first `VOTE_HASH_SIZE` bytes
pub fn truncated_sha256(data: &[u8]) -> VoteHash {
    let full = Sha256::digest(data);
    let mut bytes = [0u8; VOTE_HASH_SIZE];
    bytes.copy_from_slice(&full[..VOTE_HASH_SIZE]);
    VoteHash::from_bytes(bytes)
}

/// Default hash function (BLAKE3)
pub fn hash(data: &[u8]) -> Hash {
    blake3_hash(data)
}

/// Hash multiple pieces of data
pub fn hash_multiple(parts: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    let hash = hasher.finalize();
    Hash::from_bytes(*hash.as_bytes())
}

/// Payload a prevote commits to: `salt:exchange_rate:denom:feeder`
pub fn vote_hash_payload(
    salt: &str,
    exchange_rate: &ExchangeRate,
    denom: &Denom,
    feeder: &AccAddress,
) -> String {
    format!(
        "{}:{}:{}:{}",
        salt,
        exchange_rate.canonical_string(),
        denom,
        feeder
    )
}

/// Commitment hash for a prevote
pub fn vote_hash(
    salt: &str,
    exchange_rate: &ExchangeRate,
    denom: &Denom,
    feeder: &AccAddress,
) -> VoteHash {
    truncated_sha256(vote_hash_payload(salt, exchange_rate, denom, feeder).as_bytes())
}

/// Merkle tree root computation
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::ZERO;
    }

    if leaves.len() == 1 {
        return leaves[0];
    }

    let mut current_level: Vec<Hash> = leaves.to_vec();

    while current_level.len() > 1 {
        let mut next_level = Vec::with_capacity((current_level.len() + 1) / 2);

        for chunk in current_level.chunks(2) {
            let hash = if chunk.len() == 2 {
                hash_multiple(&[chunk[0].as_bytes(), chunk[1].as_bytes()])
            } else {
                // Odd number: hash with itself
                hash_multiple(&[chunk[0].as_bytes(), chunk[0].as_bytes()])
            };
            next_level.push(hash);
        }

        current_level = next_level;
    }

    current_level[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_blake3_hash() {
        let data = b"Hello, ORAKEL!";
        let hash1 = blake3_hash(data);
        let hash2 = blake3_hash(data);

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, Hash::ZERO);
    }

    #[test]
    fn test_truncated_sha256_is_prefix() {
        let data = b"s1:100:ukrw:V1";
        let full = sha256_hash(data);
        let truncated = truncated_sha256(data);

        assert_eq!(&full.as_bytes()[..VOTE_HASH_SIZE], truncated.as_bytes());
    }

    #[test]
    fn test_vote_hash_payload() {
        let payload = vote_hash_payload(
            "s1",
            &ExchangeRate::from(dec!(100.00)),
            &Denom::new("ukrw"),
            &AccAddress::new("V1"),
        );
        assert_eq!(payload, "s1:100:ukrw:V1");
    }

    #[test]
    fn test_vote_hash_binds_every_field() {
        let rate = ExchangeRate::from(dec!(100));
        let denom = Denom::new("ukrw");
        let feeder = AccAddress::new("V1");
        let base = vote_hash("s1", &rate, &denom, &feeder);

        assert_eq!(base, vote_hash("s1", &ExchangeRate::from(dec!(100.0)), &denom, &feeder));
        assert_ne!(base, vote_hash("s2", &rate, &denom, &feeder));
        assert_ne!(base, vote_hash("s1", &ExchangeRate::from(dec!(101)), &denom, &feeder));
        assert_ne!(base, vote_hash("s1", &rate, &Denom::new("uusd"), &feeder));
        assert_ne!(base, vote_hash("s1", &rate, &denom, &AccAddress::new("V2")));
    }

    #[test]
    fn test_merkle_root() {
        let leaves = vec![hash(b"leaf1"), hash(b"leaf2"), hash(b"leaf3")];

        let root = merkle_root(&leaves);
        assert_ne!(root, Hash::ZERO);
        assert_eq!(root, merkle_root(&leaves));
        assert_eq!(merkle_root(&[]), Hash::ZERO);
    }
}
