use dujyo_primitives::{Amount, Bps};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpvConfig {
    /// Economic validators must stake at least this much.
    #[serde(with = "dujyo_primitives::serde_amount")]
    pub min_economic_stake: Amount,
    /// Stake at which the economic score saturates at 100%.
    #[serde(with = "dujyo_primitives::serde_amount")]
    pub economic_full_stake: Amount,
    /// Verified content items at which the creative score saturates.
    pub creative_full_count: u64,
    pub min_creative_score_bps: Bps,
    /// Votes + reports + curated items at which the community score saturates.
    pub community_full_actions: u64,
    pub min_community_score_bps: Bps,
    pub lambda_economic_bps: Bps,
    pub lambda_creative_bps: Bps,
    pub lambda_community_bps: Bps,
    pub max_economic_validators: usize,
    pub max_creative_validators: usize,
    pub max_community_validators: usize,
    /// Validation rounds kept in the ring buffer.
    pub history_len: usize,
    /// Rounds returned by `stats()`.
    pub recent_rounds: usize,
}

impl Default for CpvConfig {
    fn default() -> Self {
        Self {
            min_economic_stake: 1_000,
            economic_full_stake: 10_000,
            creative_full_count: 10,
            min_creative_score_bps: 5_000,
            community_full_actions: 200,
            min_community_score_bps: 3_000,
            lambda_economic_bps: 4_000,
            lambda_creative_bps: 3_000,
            lambda_community_bps: 3_000,
            max_economic_validators: 100,
            max_creative_validators: 50,
            max_community_validators: 50,
            history_len: 100,
            recent_rounds: 10,
        }
    }
}
