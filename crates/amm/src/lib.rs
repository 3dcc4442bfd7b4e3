//! Dujyo AMM
//!
//! Constant-product (`x * y = k`) pools over pairs of ledger tokens. Pool
//! reserves live in the token ledgers under the pool's system address
//! (`pool:<A>/<B>`), so every swap and liquidity change is a pair of ledger
//! transfers staged under [`dujyo_ledger::lock_pair`] and committed together.

pub mod config;
pub mod engine;
pub mod pool;

pub use config::AmmConfig;
pub use engine::{LiquidityReceipt, PoolEngine};
pub use pool::{pool_id, quote_swap, Pool, SwapResult};
