//! Dujyo Primitives
//!
//! Shared building blocks for the Dujyo ledger/consensus core:
//! - Account addresses and token symbols
//! - Fixed-point token amounts and basis-point math (no floating point)
//! - Serde encoding for amounts in formats without 128-bit integers
//! - The unified `ChainError` taxonomy used by every engine
//! - The clock seam used by time-dependent engines
//! - The authenticated `Transaction` value consumed by the dispatcher

pub mod address;
pub mod error;
pub mod math;
pub mod serde_amount;
pub mod time;
pub mod transaction;

pub use address::{Address, TokenSymbol};
pub use error::{ChainError, Result};
pub use math::*;
pub use time::{Clock, ManualClock, SystemClock};
pub use transaction::{Transaction, TxKind, TxPayload};

/// Token quantity in atomic units of its token.
pub type Amount = u128;

/// Basis points (1 bps = 1/10_000).
pub type Bps = u32;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Monotonic staking position identifier.
pub type PositionId = u64;
