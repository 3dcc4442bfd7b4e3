//! Dujyo Staking Engine
//!
//! Time-locked staking positions over a single ledger token. Principal sits in
//! the `staking:custody` account and rewards are paid from the funded
//! `staking:rewards` reserve; both are ordinary ledger balances, so token
//! conservation covers staked funds.
//!
//! Rewards accrue linearly from each position's last accrual point:
//! `principal * apy_bps * elapsed / (10_000 * SECONDS_PER_YEAR)`.

pub mod config;
pub mod engine;
pub mod position;

pub use config::StakingConfig;
pub use engine::{StakingEngine, StakingStats, UnstakeReceipt};
pub use position::StakingPosition;
