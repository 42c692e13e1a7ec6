//! ORAKEL Oracle Module
//!
//! Commit-reveal exchange rate voting:
//! - Prevotes commit to a salted rate hash, votes reveal it one period later
//! - Validators may delegate feeding to another account
//! - Each period ends with a power-weighted median tally per denom
//! - Missed votes are counted per slash window

pub mod msgs;
pub mod staking;
pub mod feeder;
pub mod ballot;
pub mod validator;
pub mod tally;
pub mod participation;
pub mod keeper;
pub mod genesis;

pub use msgs::*;
pub use staking::*;
pub use feeder::*;
pub use ballot::*;
pub use validator::*;
pub use tally::*;
pub use participation::*;
pub use keeper::*;
pub use genesis::*;
