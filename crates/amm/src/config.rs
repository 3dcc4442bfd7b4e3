use dujyo_primitives::{Amount, Bps};
use serde::{Deserialize, Serialize};

/// Default swap fee (0.3%).
pub const DEFAULT_FEE_BPS: Bps = 30;

/// Default slippage tolerance (5%).
pub const DEFAULT_MAX_SLIPPAGE_BPS: Bps = 500;

/// Smallest LP share mint accepted by `add_liquidity`.
pub const MIN_LIQUIDITY_SHARES: Amount = 1_000;

/// Upper bound on a pool's fee (10%).
pub const MAX_FEE_BPS: Bps = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmmConfig {
    /// Fee applied to pools created implicitly by the first deposit.
    pub default_fee_bps: Bps,
    /// Slippage tolerance used when a swap does not carry its own.
    pub default_max_slippage_bps: Bps,
    #[serde(with = "dujyo_primitives::serde_amount")]
    pub min_liquidity_shares: Amount,
    pub max_fee_bps: Bps,
}

impl Default for AmmConfig {
    fn default() -> Self {
        Self {
            default_fee_bps: DEFAULT_FEE_BPS,
            default_max_slippage_bps: DEFAULT_MAX_SLIPPAGE_BPS,
            min_liquidity_shares: MIN_LIQUIDITY_SHARES,
            max_fee_bps: MAX_FEE_BPS,
        }
    }
}
