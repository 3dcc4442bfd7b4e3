//! Token configuration. A single parametrised ledger type covers every token
//! variant; presets below carry the production parameters.

use dujyo_primitives::{Address, Amount, TokenSymbol};
use serde::{Deserialize, Serialize};

/// Native token ticker.
pub const NATIVE_SYMBOL: &str = "DYO";

/// Stable token ticker.
pub const STABLE_SYMBOL: &str = "DYS";

/// Native token cap in whole tokens.
pub const NATIVE_MAX_SUPPLY_TOKENS: u128 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: TokenSymbol,
    pub decimals: u8,
    /// Hard cap on total supply in atomic units; `None` means uncapped.
    #[serde(default, with = "dujyo_primitives::serde_amount::option")]
    pub max_supply: Option<Amount>,
    pub mintable: bool,
    pub burnable: bool,
    /// Supply credited to `owner` when the ledger is created.
    #[serde(default, with = "dujyo_primitives::serde_amount::option")]
    pub initial_supply: Option<Amount>,
    /// Token administrator; the only sender allowed to mint through the dispatcher.
    pub owner: Address,
}

impl TokenConfig {
    /// DYO: 18 decimals, capped at one billion tokens.
    pub fn native(owner: impl Into<Address>) -> Self {
        Self {
            symbol: TokenSymbol::new(NATIVE_SYMBOL),
            decimals: 18,
            max_supply: Some(NATIVE_MAX_SUPPLY_TOKENS * 10u128.pow(18)),
            mintable: true,
            burnable: true,
            initial_supply: None,
            owner: owner.into(),
        }
    }

    /// DYS: 6 decimals, uncapped.
    pub fn stable(owner: impl Into<Address>) -> Self {
        Self {
            symbol: TokenSymbol::new(STABLE_SYMBOL),
            decimals: 6,
            max_supply: None,
            mintable: true,
            burnable: true,
            initial_supply: None,
            owner: owner.into(),
        }
    }

    pub fn with_initial_supply(mut self, amount: Amount) -> Self {
        self.initial_supply = Some(amount);
        self
    }

    /// One whole token in atomic units.
    pub fn unit(&self) -> Amount {
        10u128.pow(self.decimals as u32)
    }
}
