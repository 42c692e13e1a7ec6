//! ORAKEL Node Implementation
//!
//! Combines the oracle keeper with:
//! - a state backend (memory or sled)
//! - a FIFO mempool and block ticker
//! - the HTTP API

mod api;
mod mempool;
mod node;
mod runtime;
mod store;

pub use api::*;
pub use mempool::*;
pub use node::*;
pub use runtime::*;
pub use store::*;
