//! ORAKEL Cryptography Module
//!
//! Provides the hashing primitives the oracle relies on:
//! - SHA-256 truncated to 20 bytes for prevote commitments
//! - BLAKE3 for state roots and transaction ids

pub mod hashing;

pub use hashing::*;
