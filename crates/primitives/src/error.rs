//! Unified error taxonomy for the ledger, pool, staking, consensus and dispatcher engines.

use crate::{Address, Amount, Bps, PositionId, Timestamp, TokenSymbol};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    // ---- ledger -----------------------------------------------------------
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("insufficient {token} balance for {address}: available {available}, required {required}")]
    InsufficientBalance {
        token: TokenSymbol,
        address: Address,
        available: Amount,
        required: Amount,
    },

    #[error("insufficient {token} allowance: available {available}, required {required}")]
    InsufficientAllowance {
        token: TokenSymbol,
        available: Amount,
        required: Amount,
    },

    #[error("token {0} is paused")]
    ContractPaused(TokenSymbol),

    #[error("token {0} is not mintable")]
    NotMintable(TokenSymbol),

    #[error("token {0} is not burnable")]
    NotBurnable(TokenSymbol),

    #[error("supply cap exceeded for {token}: cap {cap}, requested supply {requested}")]
    SupplyCapExceeded {
        token: TokenSymbol,
        cap: Amount,
        requested: Amount,
    },

    #[error("unknown token {0}")]
    UnknownToken(TokenSymbol),

    #[error("token {0} is already registered")]
    TokenAlreadyRegistered(TokenSymbol),

    // ---- pool engine ------------------------------------------------------
    #[error("pool {0} not found")]
    PoolNotFound(String),

    #[error("pool {0} already exists")]
    PoolAlreadyExists(String),

    #[error("pool {0} is inactive")]
    PoolInactive(String),

    #[error("pool engine is paused: {0}")]
    AmmPaused(String),

    #[error("a pool needs two distinct tokens, got {0} twice")]
    IdenticalTokens(TokenSymbol),

    #[error("minted liquidity {minted} below minimum {minimum}")]
    LiquidityTooSmall { minted: Amount, minimum: Amount },

    #[error("slippage {actual_bps} bps exceeds maximum {max_bps} bps")]
    SlippageExceeded { actual_bps: Bps, max_bps: Bps },

    #[error("output {amount_out} below requested minimum {min_amount_out}")]
    OutputBelowMinimum {
        amount_out: Amount,
        min_amount_out: Amount,
    },

    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    // ---- staking ----------------------------------------------------------
    #[error("staking position {0} not found")]
    PositionNotFound(PositionId),

    #[error("{caller} is not authorized for this operation")]
    Unauthorized { caller: Address },

    #[error("staking position {id} is locked until {unlock_at}")]
    PositionLocked { id: PositionId, unlock_at: Timestamp },

    #[error("staking position {0} is no longer active")]
    PositionInactive(PositionId),

    #[error("stake {amount} outside allowed range [{min}, {max}]")]
    StakeOutOfRange {
        amount: Amount,
        min: Amount,
        max: Amount,
    },

    #[error("staking is paused")]
    StakingPaused,

    #[error("reward reserve exhausted: available {available}, required {required}")]
    RewardReserveExhausted { available: Amount, required: Amount },

    // ---- consensus --------------------------------------------------------
    #[error("no validators available for proposer selection")]
    NoValidatorsAvailable,

    #[error("stake {stake} below validator minimum {minimum}")]
    StakeBelowMinimum { stake: Amount, minimum: Amount },

    #[error("validator score {score_bps} bps below minimum {minimum_bps} bps")]
    ScoreBelowMinimum { score_bps: Bps, minimum_bps: Bps },

    #[error("validator limit reached for {category} ({limit})")]
    ValidatorLimitReached { category: String, limit: usize },

    // ---- dispatcher -------------------------------------------------------
    #[error("unknown transaction kind: {0}")]
    UnknownTransactionKind(String),

    #[error("transaction is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("pending transaction queue is full ({capacity})")]
    MempoolFull { capacity: usize },

    #[error("invalid nonce for {address}: expected {expected}, got {got}")]
    InvalidNonce {
        address: Address,
        expected: u64,
        got: u64,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    /// Committing a validated state change would have produced a negative
    /// balance or reserve. The node must stop.
    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("node halted after an invariant violation")]
    Halted,
}

impl ChainError {
    /// Fatal errors indicate corrupted state; processing must not continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainError::InvariantViolation(_) | ChainError::Halted)
    }

    /// Stable machine-readable kind, used in logs and receipts.
    pub fn kind(&self) -> &'static str {
        match self {
            ChainError::InvalidAmount => "InvalidAmount",
            ChainError::InsufficientBalance { .. } => "InsufficientBalance",
            ChainError::InsufficientAllowance { .. } => "InsufficientAllowance",
            ChainError::ContractPaused(_) => "ContractPaused",
            ChainError::NotMintable(_) => "NotMintable",
            ChainError::NotBurnable(_) => "NotBurnable",
            ChainError::SupplyCapExceeded { .. } => "SupplyCapExceeded",
            ChainError::UnknownToken(_) => "UnknownToken",
            ChainError::TokenAlreadyRegistered(_) => "TokenAlreadyRegistered",
            ChainError::PoolNotFound(_) => "PoolNotFound",
            ChainError::PoolAlreadyExists(_) => "PoolAlreadyExists",
            ChainError::PoolInactive(_) => "PoolInactive",
            ChainError::AmmPaused(_) => "AmmPaused",
            ChainError::IdenticalTokens(_) => "IdenticalTokens",
            ChainError::LiquidityTooSmall { .. } => "LiquidityTooSmall",
            ChainError::SlippageExceeded { .. } => "SlippageExceeded",
            ChainError::OutputBelowMinimum { .. } => "OutputBelowMinimum",
            ChainError::InsufficientLiquidity(_) => "InsufficientLiquidity",
            ChainError::PositionNotFound(_) => "PositionNotFound",
            ChainError::Unauthorized { .. } => "Unauthorized",
            ChainError::PositionLocked { .. } => "PositionLocked",
            ChainError::PositionInactive(_) => "PositionInactive",
            ChainError::StakeOutOfRange { .. } => "StakeOutOfRange",
            ChainError::StakingPaused => "StakingPaused",
            ChainError::RewardReserveExhausted { .. } => "RewardReserveExhausted",
            ChainError::NoValidatorsAvailable => "NoValidatorsAvailable",
            ChainError::StakeBelowMinimum { .. } => "StakeBelowMinimum",
            ChainError::ScoreBelowMinimum { .. } => "ScoreBelowMinimum",
            ChainError::ValidatorLimitReached { .. } => "ValidatorLimitReached",
            ChainError::UnknownTransactionKind(_) => "UnknownTransactionKind",
            ChainError::MissingField(_) => "MissingField",
            ChainError::MempoolFull { .. } => "MempoolFull",
            ChainError::InvalidNonce { .. } => "InvalidNonce",
            ChainError::InvalidParameter(_) => "InvalidParameter",
            ChainError::ArithmeticOverflow(_) => "ArithmeticOverflow",
            ChainError::InvariantViolation(_) => "InvariantViolation",
            ChainError::Halted => "Halted",
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
