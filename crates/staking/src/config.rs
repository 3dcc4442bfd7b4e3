use dujyo_ledger::config::NATIVE_SYMBOL;
use dujyo_primitives::{Amount, Bps, TokenSymbol};
use serde::{Deserialize, Serialize};

const DYO: Amount = 1_000_000_000_000_000_000;

/// Thirty days.
pub const DEFAULT_LOCK_PERIOD_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingConfig {
    /// Token staked and paid out as rewards.
    pub token: TokenSymbol,
    #[serde(with = "dujyo_primitives::serde_amount")]
    pub min_stake: Amount,
    /// `None` means no upper bound.
    #[serde(default, with = "dujyo_primitives::serde_amount::option")]
    pub max_stake: Option<Amount>,
    pub lock_period_secs: u64,
    /// Initial annual yield; adjustable at runtime within [0, 10_000].
    pub apy_bps: Bps,
    /// Charged on principal at unstake and recycled into the reward reserve.
    pub unstake_fee_bps: Bps,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            token: TokenSymbol::new(NATIVE_SYMBOL),
            min_stake: 100 * DYO,
            max_stake: Some(10_000_000 * DYO),
            lock_period_secs: DEFAULT_LOCK_PERIOD_SECS,
            apy_bps: 1_200,
            unstake_fee_bps: 100,
        }
    }
}
