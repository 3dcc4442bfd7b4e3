//! Chain-wide configuration and genesis.

use dujyo_amm::AmmConfig;
use dujyo_cpv::{CpvConfig, Evidence};
use dujyo_ledger::TokenConfig;
use dujyo_primitives::{Address, Amount, TokenSymbol};
use dujyo_staking::StakingConfig;
use serde::{Deserialize, Serialize};

/// Account that owns the preset tokens and receives genesis supply by default.
pub const DEFAULT_TREASURY: &str = "dujyo-treasury";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    /// An empty block is only sealed after this long without one.
    pub idle_window_secs: u64,
    pub max_txs_per_block: usize,
    /// Capacity of the pending transaction queue.
    pub max_pending: usize,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            idle_window_secs: 30,
            max_txs_per_block: 500,
            max_pending: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub address: Address,
    pub token: TokenSymbol,
    #[serde(with = "dujyo_primitives::serde_amount")]
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub address: Address,
    #[serde(flatten)]
    pub evidence: Evidence,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// Minted at startup, on top of each token's own `initial_supply`.
    pub allocations: Vec<GenesisAllocation>,
    pub validators: Vec<GenesisValidator>,
    /// Minted straight into the staking reward reserve.
    #[serde(with = "dujyo_primitives::serde_amount")]
    pub staking_reward_reserve: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub tokens: Vec<TokenConfig>,
    pub amm: AmmConfig,
    pub staking: StakingConfig,
    pub cpv: CpvConfig,
    pub block: BlockConfig,
    pub genesis: GenesisConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        let treasury = Address::new(DEFAULT_TREASURY);
        Self {
            tokens: vec![TokenConfig::native(treasury.clone()), TokenConfig::stable(treasury.clone())],
            amm: AmmConfig::default(),
            staking: StakingConfig::default(),
            cpv: CpvConfig::default(),
            block: BlockConfig::default(),
            genesis: GenesisConfig {
                validators: vec![GenesisValidator {
                    address: treasury,
                    evidence: Evidence::Economic { stake: 10_000 },
                }],
                ..GenesisConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip() {
        let config = ChainConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        let parsed: ChainConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let text = r#"
            [block]
            idle_window_secs = 5

            [[genesis.allocations]]
            address = "alice"
            token = "dyo"
            amount = 1000

            [[genesis.validators]]
            address = "artist"
            category = "creative"
            verified_content = ["a", "b", "c", "d", "e"]

            [[genesis.validators]]
            address = "whale"
            category = "economic"
            stake = "30000000000000000000000"
        "#;
        let config: ChainConfig = toml::from_str(text).unwrap();
        assert_eq!(config.block.idle_window_secs, 5);
        assert_eq!(config.block.max_txs_per_block, 500);
        assert_eq!(config.tokens.len(), 2);
        assert_eq!(config.genesis.allocations[0].token.as_str(), "DYO");
        assert!(matches!(
            config.genesis.validators[0].evidence,
            Evidence::Creative { .. }
        ));
        assert_eq!(
            config.genesis.validators[1].evidence,
            Evidence::Economic { stake: 30_000 * 10u128.pow(18) }
        );
    }

    #[test]
    fn test_shipped_node_config_parses() {
        #[derive(Deserialize)]
        struct NodeFile {
            chain: ChainConfig,
        }

        let text = include_str!("../../../config/dujyo.toml");
        let file: NodeFile = toml::from_str(text).unwrap();
        let dyo = 10u128.pow(18);
        assert_eq!(file.chain.genesis.staking_reward_reserve, 1_000_000 * dyo);
        assert_eq!(file.chain.genesis.allocations[0].amount, 100_000_000 * dyo);
        assert_eq!(file.chain.staking.max_stake, StakingConfig::default().max_stake);
        assert_eq!(file.chain.genesis.validators.len(), 2);
    }

    #[test]
    fn test_large_amounts_round_trip_through_toml() {
        let mut config = ChainConfig::default();
        config.genesis.staking_reward_reserve = u128::MAX;
        let text = toml::to_string(&config).unwrap();
        let parsed: ChainConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
