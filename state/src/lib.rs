//! ORAKEL State Management
//!
//! Provides state storage, versioning, and state root computation.
//! Uses an ordered key-value model where state = { key → value }

pub mod store;
pub mod memory;
pub mod persistent;
pub mod snapshot;

pub use store::*;
pub use memory::*;
pub use persistent::*;
pub use snapshot::*;
