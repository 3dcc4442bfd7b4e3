//! Validator registry, proposer selection and validation history.

use crate::config::CpvConfig;
use crate::validator::{Category, Evidence, Validator};
use dujyo_primitives::{Address, Amount, Bps, ChainError, Clock, Result, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundOutcome {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRound {
    pub round: u64,
    pub validator: Address,
    pub block_id: String,
    pub timestamp: Timestamp,
    pub outcome: RoundOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusStats {
    pub economic_validators: usize,
    pub creative_validators: usize,
    pub community_validators: usize,
    pub total_validators: usize,
    /// Rounds recorded since start, including those evicted from history.
    pub total_rounds: u64,
    /// Newest first.
    pub recent_rounds: Vec<ValidationRound>,
}

#[derive(Debug, Default)]
struct RegistryState {
    validators: BTreeMap<Address, Validator>,
    next_seq: u64,
    history: VecDeque<ValidationRound>,
    total_rounds: u64,
}

impl RegistryState {
    fn count(&self, category: Category) -> usize {
        self.validators.values().filter(|v| v.category == category).count()
    }
}

pub struct ValidatorRegistry {
    config: CpvConfig,
    clock: Arc<dyn Clock>,
    state: RwLock<RegistryState>,
}

impl ValidatorRegistry {
    pub fn new(config: CpvConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn config(&self) -> &CpvConfig {
        &self.config
    }

    pub fn register_economic(&self, address: &Address, stake: Amount) -> Result<Validator> {
        if stake < self.config.min_economic_stake {
            return Err(ChainError::StakeBelowMinimum {
                stake,
                minimum: self.config.min_economic_stake,
            });
        }
        self.register(address, Evidence::Economic { stake }, 0)
    }

    /// Duplicate content ids count once.
    pub fn register_creative<I, S>(&self, address: &Address, verified_content: I) -> Result<Validator>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let verified_content: BTreeSet<String> = verified_content.into_iter().map(Into::into).collect();
        self.register(
            address,
            Evidence::Creative { verified_content },
            self.config.min_creative_score_bps,
        )
    }

    pub fn register_community(&self, address: &Address, votes: u64, reports: u64, curated: u64) -> Result<Validator> {
        self.register(
            address,
            Evidence::Community { votes, reports, curated },
            self.config.min_community_score_bps,
        )
    }

    fn register(&self, address: &Address, evidence: Evidence, minimum_bps: Bps) -> Result<Validator> {
        let score_bps = evidence.score_bps(&self.config);
        if score_bps < minimum_bps {
            return Err(ChainError::ScoreBelowMinimum {
                score_bps,
                minimum_bps,
            });
        }
        let category = evidence.category();

        let mut state = self.state.write();
        let existing = state.validators.get(address).cloned();
        let moving_in = existing.as_ref().map_or(true, |v| v.category != category);
        let limit = category.capacity(&self.config);
        if moving_in && state.count(category) >= limit {
            return Err(ChainError::ValidatorLimitReached {
                category: category.to_string(),
                limit,
            });
        }

        let (registration_seq, registered_at) = match &existing {
            Some(previous) => (previous.registration_seq, previous.registered_at),
            None => {
                let seq = state.next_seq;
                state.next_seq += 1;
                (seq, self.clock.now_secs())
            }
        };
        let validator = Validator {
            address: address.clone(),
            category,
            score_bps,
            evidence,
            registration_seq,
            registered_at,
        };
        state.validators.insert(address.clone(), validator.clone());

        info!(
            target: "cpv",
            validator = %address,
            category = %category,
            score_bps,
            reregistered = existing.is_some(),
            "Validator registered"
        );
        Ok(validator)
    }

    /// Highest `score_bps * lambda_bps`; ties go to the earliest registration.
    pub fn select_proposer(&self) -> Result<Validator> {
        let state = self.state.read();
        let chosen = state
            .validators
            .values()
            .max_by(|a, b| {
                a.weight(&self.config)
                    .cmp(&b.weight(&self.config))
                    .then_with(|| b.registration_seq.cmp(&a.registration_seq))
            })
            .cloned()
            .ok_or(ChainError::NoValidatorsAvailable)?;

        debug!(
            target: "cpv",
            proposer = %chosen.address,
            weight = chosen.weight(&self.config),
            "Proposer selected"
        );
        Ok(chosen)
    }

    /// Append a round, evicting the oldest past `history_len`.
    pub fn record_round(&self, validator: &Address, block_id: impl Into<String>, outcome: RoundOutcome) -> ValidationRound {
        let mut state = self.state.write();
        state.total_rounds += 1;
        let round = ValidationRound {
            round: state.total_rounds,
            validator: validator.clone(),
            block_id: block_id.into(),
            timestamp: self.clock.now_secs(),
            outcome,
        };
        state.history.push_back(round.clone());
        while state.history.len() > self.config.history_len {
            state.history.pop_front();
        }
        debug!(target: "cpv", round = round.round, validator = %validator, ?outcome, "Round recorded");
        round
    }

    pub fn validator(&self, address: &Address) -> Option<Validator> {
        self.state.read().validators.get(address).cloned()
    }

    /// All validators in registration order.
    pub fn validators(&self) -> Vec<Validator> {
        let mut all: Vec<Validator> = self.state.read().validators.values().cloned().collect();
        all.sort_by_key(|v| v.registration_seq);
        all
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<ValidationRound> {
        self.state.read().history.iter().cloned().collect()
    }

    pub fn stats(&self) -> ConsensusStats {
        let state = self.state.read();
        ConsensusStats {
            economic_validators: state.count(Category::Economic),
            creative_validators: state.count(Category::Creative),
            community_validators: state.count(Category::Community),
            total_validators: state.validators.len(),
            total_rounds: state.total_rounds,
            recent_rounds: state
                .history
                .iter()
                .rev()
                .take(self.config.recent_rounds)
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dujyo_primitives::ManualClock;

    fn registry() -> ValidatorRegistry {
        ValidatorRegistry::new(CpvConfig::default(), Arc::new(ManualClock::new(1_000)))
    }

    fn addr(s: &str) -> Address {
        Address::new(s)
    }

    #[test]
    fn test_registration_thresholds() {
        let registry = registry();
        assert!(matches!(
            registry.register_economic(&addr("e"), 999),
            Err(ChainError::StakeBelowMinimum { stake: 999, minimum: 1_000 })
        ));
        assert!(matches!(
            registry.register_creative(&addr("c"), ["a", "b", "c", "d"]),
            Err(ChainError::ScoreBelowMinimum { score_bps: 4_000, minimum_bps: 5_000 })
        ));
        // duplicates do not inflate the score
        assert!(registry
            .register_creative(&addr("c"), ["a", "a", "a", "a", "a", "b", "c", "d"])
            .is_err());
        assert!(matches!(
            registry.register_community(&addr("m"), 10, 10, 39),
            Err(ChainError::ScoreBelowMinimum { score_bps: 2_950, .. })
        ));

        registry.register_economic(&addr("e"), 1_000).unwrap();
        registry.register_creative(&addr("c"), ["a", "b", "c", "d", "e"]).unwrap();
        registry.register_community(&addr("m"), 20, 20, 20).unwrap();
        assert_eq!(registry.stats().total_validators, 3);
    }

    #[test]
    fn test_select_proposer_greedy_and_deterministic() {
        let registry = registry();
        assert!(matches!(
            registry.select_proposer(),
            Err(ChainError::NoValidatorsAvailable)
        ));

        // economic 10_000 * 4_000 beats creative 10_000 * 3_000
        let content: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        registry.register_creative(&addr("artist"), content).unwrap();
        registry.register_economic(&addr("whale"), 50_000).unwrap();
        for _ in 0..5 {
            assert_eq!(registry.select_proposer().unwrap().address, addr("whale"));
        }
    }

    #[test]
    fn test_ties_go_to_earliest_registration() {
        let registry = registry();
        registry.register_community(&addr("first"), 100, 100, 0).unwrap();
        let content: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        registry.register_creative(&addr("second"), content).unwrap();
        assert_eq!(registry.select_proposer().unwrap().address, addr("first"));

        // re-registration keeps its slot in the order
        registry.register_community(&addr("first"), 200, 0, 0).unwrap();
        assert_eq!(registry.select_proposer().unwrap().address, addr("first"));
        assert_eq!(registry.validators()[0].address, addr("first"));
    }

    #[test]
    fn test_category_caps() {
        let config = CpvConfig {
            max_creative_validators: 1,
            ..CpvConfig::default()
        };
        let registry = ValidatorRegistry::new(config, Arc::new(ManualClock::new(0)));
        let content = || (0..5).map(|i| i.to_string()).collect::<Vec<_>>();
        registry.register_creative(&addr("a"), content()).unwrap();
        // same address again is an update, not a new slot
        registry.register_creative(&addr("a"), content()).unwrap();
        assert!(matches!(
            registry.register_creative(&addr("b"), content()),
            Err(ChainError::ValidatorLimitReached { limit: 1, .. })
        ));
        registry.register_economic(&addr("b"), 5_000).unwrap();
    }

    #[test]
    fn test_history_is_bounded() {
        let registry = registry();
        let v = addr("v");
        for i in 0..105 {
            registry.record_round(&v, format!("block-{i}"), RoundOutcome::Accepted);
        }
        let history = registry.history();
        assert_eq!(history.len(), 100);
        assert_eq!(history[0].block_id, "block-5");

        let stats = registry.stats();
        assert_eq!(stats.total_rounds, 105);
        assert_eq!(stats.recent_rounds.len(), 10);
        assert_eq!(stats.recent_rounds[0].block_id, "block-104");
    }
}
