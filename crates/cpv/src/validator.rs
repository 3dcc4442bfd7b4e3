//! Validator records and category scoring.

use crate::config::CpvConfig;
use dujyo_primitives::math::BPS_DENOM;
use dujyo_primitives::{Address, Amount, Bps, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Economic,
    Creative,
    Community,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Economic, Category::Creative, Category::Community];

    pub fn lambda_bps(self, config: &CpvConfig) -> Bps {
        match self {
            Category::Economic => config.lambda_economic_bps,
            Category::Creative => config.lambda_creative_bps,
            Category::Community => config.lambda_community_bps,
        }
    }

    pub fn capacity(self, config: &CpvConfig) -> usize {
        match self {
            Category::Economic => config.max_economic_validators,
            Category::Creative => config.max_creative_validators,
            Category::Community => config.max_community_validators,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Economic => "economic",
            Category::Creative => "creative",
            Category::Community => "community",
        })
    }
}

/// What a validator presented at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum Evidence {
    Economic {
        #[serde(with = "dujyo_primitives::serde_amount")]
        stake: Amount,
    },
    Creative { verified_content: BTreeSet<String> },
    Community { votes: u64, reports: u64, curated: u64 },
}

impl Evidence {
    pub fn category(&self) -> Category {
        match self {
            Evidence::Economic { .. } => Category::Economic,
            Evidence::Creative { .. } => Category::Creative,
            Evidence::Community { .. } => Category::Community,
        }
    }

    /// Score in bps, saturating at 10_000.
    pub fn score_bps(&self, config: &CpvConfig) -> Bps {
        match self {
            Evidence::Economic { stake } => ratio_bps(*stake, config.economic_full_stake),
            Evidence::Creative { verified_content } => {
                ratio_bps(verified_content.len() as u128, config.creative_full_count as u128)
            }
            Evidence::Community { votes, reports, curated } => {
                let actions = (*votes as u128) + (*reports as u128) + (*curated as u128);
                ratio_bps(actions, config.community_full_actions as u128)
            }
        }
    }
}

fn ratio_bps(value: u128, full: u128) -> Bps {
    if full == 0 {
        return BPS_DENOM;
    }
    let bps = value.saturating_mul(BPS_DENOM as u128) / full;
    bps.min(BPS_DENOM as u128) as Bps
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub category: Category,
    pub score_bps: Bps,
    pub evidence: Evidence,
    /// Position in registration order; earlier wins selection ties.
    pub registration_seq: u64,
    pub registered_at: Timestamp,
}

impl Validator {
    /// Selection weight: `score_bps * lambda_bps`.
    pub fn weight(&self, config: &CpvConfig) -> u64 {
        self.score_bps as u64 * self.category.lambda_bps(config) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_economic_score_saturates() {
        let config = CpvConfig::default();
        assert_eq!(Evidence::Economic { stake: 1_000 }.score_bps(&config), 1_000);
        assert_eq!(Evidence::Economic { stake: 10_000 }.score_bps(&config), 10_000);
        assert_eq!(Evidence::Economic { stake: u128::MAX }.score_bps(&config), 10_000);
    }

    #[test]
    fn test_creative_and_community_scores() {
        let config = CpvConfig::default();
        let content: BTreeSet<String> = (0..7).map(|i| format!("track-{i}")).collect();
        assert_eq!(Evidence::Creative { verified_content: content }.score_bps(&config), 7_000);
        assert_eq!(
            Evidence::Community { votes: 30, reports: 20, curated: 10 }.score_bps(&config),
            3_000
        );
    }

    #[test]
    fn test_evidence_wire_format() {
        let evidence = Evidence::Community { votes: 1, reports: 2, curated: 3 };
        let json = serde_json::to_string(&evidence).unwrap();
        assert!(json.contains(r#""category":"community""#));
    }

    #[test]
    fn test_economic_validator_round_trips() {
        let stake = 25_000 * 10u128.pow(18);
        let validator = Validator {
            address: Address::new("whale"),
            category: Category::Economic,
            score_bps: 10_000,
            evidence: Evidence::Economic { stake },
            registration_seq: 0,
            registered_at: 1_700_000_000,
        };
        let json = serde_json::to_string(&validator).unwrap();
        let back: Validator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, validator);

        let small: Evidence = serde_json::from_str(r#"{"category":"economic","stake":10000}"#).unwrap();
        assert_eq!(small, Evidence::Economic { stake: 10_000 });
    }
}
