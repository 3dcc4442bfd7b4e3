//! Dujyo Token Ledger
//!
//! One [`TokenLedger`] per token symbol, each a single writer-exclusive region:
//! every check-then-act sequence runs under one write lock. Engines that move
//! two tokens at once take both ledgers through [`lock_pair`], which acquires
//! locks in [`TokenSymbol`](dujyo_primitives::TokenSymbol) order, then validate
//! both legs before committing either.

pub mod config;
pub mod registry;
pub mod token;

pub use config::TokenConfig;
pub use registry::LedgerRegistry;
pub use token::{lock_pair, LedgerState, TokenInfo, TokenLedger};
