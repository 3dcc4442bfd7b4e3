//! Account addresses and token symbols.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix reserved for protocol-owned accounts (pool reserves, staking custody).
const SYSTEM_PREFIXES: [&str; 2] = ["pool:", "staking:"];

/// Account address as presented by the (already authenticated) caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Reserve account of an AMM pool.
    pub fn pool(pool_id: &str) -> Self {
        Self(format!("pool:{pool_id}"))
    }

    /// Account holding staked principal.
    pub fn staking_custody() -> Self {
        Self("staking:custody".to_string())
    }

    /// Account holding the staking reward reserve.
    pub fn staking_rewards() -> Self {
        Self("staking:rewards".to_string())
    }

    /// Protocol-owned accounts have no key; funds only leave them via engine transitions.
    pub fn is_system(&self) -> bool {
        SYSTEM_PREFIXES.iter().any(|p| self.0.starts_with(p))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Upper-cased token ticker. The derived ordering is the global ledger lock order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TokenSymbol(String);

impl TokenSymbol {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TokenSymbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TokenSymbol {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<TokenSymbol> for String {
    fn from(value: TokenSymbol) -> Self {
        value.0
    }
}
