//! Node state: owns every engine, the pending queue and the block chain, and
//! exposes the read API the RPC layer consumes.

use crate::block::{Block, BlockProducer};
use crate::config::ChainConfig;
use crate::dispatcher::{BatchOutcome, Dispatcher, TxReceipt};
use dujyo_amm::{Pool, PoolEngine, SwapResult};
use dujyo_cpv::{ConsensusStats, Evidence, RoundOutcome, Validator, ValidatorRegistry};
use dujyo_ledger::{LedgerRegistry, TokenInfo};
use dujyo_primitives::{Address, Amount, ChainError, Clock, Result, TokenSymbol, Transaction};
use dujyo_staking::{StakingEngine, StakingPosition, StakingStats};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Point-in-time view of the canonical state, for the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub height: u64,
    pub latest_hash: String,
    pub tokens: Vec<TokenInfo>,
    pub balances: BTreeMap<TokenSymbol, BTreeMap<Address, Amount>>,
    pub pools: Vec<Pool>,
    pub positions: Vec<StakingPosition>,
    pub validators: Vec<Validator>,
    pub nonces: BTreeMap<Address, u64>,
    pub halted: Option<String>,
}

pub struct Node {
    config: ChainConfig,
    clock: Arc<dyn Clock>,
    ledgers: Arc<LedgerRegistry>,
    amm: Arc<PoolEngine>,
    staking: Arc<StakingEngine>,
    cpv: Arc<ValidatorRegistry>,
    dispatcher: Dispatcher,
    pending: Mutex<VecDeque<Transaction>>,
    blocks: RwLock<Vec<Block>>,
    producer: Mutex<BlockProducer>,
}

impl Node {
    /// Build genesis state: tokens, allocations, reward reserve and validators.
    pub fn from_config(config: ChainConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let ledgers = Arc::new(LedgerRegistry::new());
        for token in &config.tokens {
            ledgers.register(token.clone())?;
        }
        for allocation in &config.genesis.allocations {
            ledgers
                .ledger(&allocation.token)?
                .mint(&allocation.address, allocation.amount)?;
        }
        if config.genesis.staking_reward_reserve > 0 {
            ledgers
                .ledger(&config.staking.token)?
                .mint(&Address::staking_rewards(), config.genesis.staking_reward_reserve)?;
        }

        let amm = Arc::new(PoolEngine::new(config.amm.clone(), ledgers.clone()));
        let staking = Arc::new(StakingEngine::new(
            config.staking.clone(),
            &ledgers,
            clock.clone(),
        )?);
        let cpv = Arc::new(ValidatorRegistry::new(config.cpv.clone(), clock.clone()));
        for validator in &config.genesis.validators {
            match &validator.evidence {
                Evidence::Economic { stake } => cpv.register_economic(&validator.address, *stake)?,
                Evidence::Creative { verified_content } => {
                    cpv.register_creative(&validator.address, verified_content.iter().cloned())?
                }
                Evidence::Community { votes, reports, curated } => {
                    cpv.register_community(&validator.address, *votes, *reports, *curated)?
                }
            };
        }

        let default_token = config
            .tokens
            .first()
            .map(|t| t.symbol.clone())
            .ok_or(ChainError::InvalidParameter("at least one token must be configured"))?;
        let dispatcher = Dispatcher::new(ledgers.clone(), amm.clone(), staking.clone(), default_token);

        let now = clock.now_secs();
        let genesis = Block::genesis(now);
        info!(
            target: "block",
            hash = %genesis.hash,
            tokens = config.tokens.len(),
            allocations = config.genesis.allocations.len(),
            validators = config.genesis.validators.len(),
            "Genesis block created"
        );

        Ok(Self {
            producer: Mutex::new(BlockProducer::new(config.block.clone(), now)),
            config,
            clock,
            ledgers,
            amm,
            staking,
            cpv,
            dispatcher,
            pending: Mutex::new(VecDeque::new()),
            blocks: RwLock::new(vec![genesis]),
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn ledgers(&self) -> &Arc<LedgerRegistry> {
        &self.ledgers
    }

    pub fn amm(&self) -> &Arc<PoolEngine> {
        &self.amm
    }

    pub fn staking(&self) -> &Arc<StakingEngine> {
        &self.staking
    }

    pub fn cpv(&self) -> &Arc<ValidatorRegistry> {
        &self.cpv
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Queue a transaction for the next block.
    pub fn submit(&self, tx: Transaction) -> Result<String> {
        if self.dispatcher.is_halted() {
            return Err(ChainError::Halted);
        }
        let capacity = self.config.block.max_pending;
        let mut pending = self.pending.lock();
        if pending.len() >= capacity {
            return Err(ChainError::MempoolFull { capacity });
        }
        let hash = tx.hash();
        pending.push_back(tx);
        debug!(target: "block", tx = %hash, pending = pending.len(), "Transaction queued");
        Ok(hash)
    }

    /// Apply a transaction immediately, outside block production. A success
    /// restarts the idle window.
    pub fn execute(&self, tx: &Transaction) -> Result<TxReceipt> {
        let receipt = self.dispatcher.apply(tx)?;
        self.producer.lock().record_activity(self.clock.now_secs());
        Ok(receipt)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// One production step: select a proposer, apply up to
    /// `max_txs_per_block` pending transactions, verify engine invariants,
    /// seal the block and record the round. Returns `None` when there is
    /// nothing to do yet.
    pub fn tick(&self) -> Result<Option<Block>> {
        if self.dispatcher.is_halted() {
            return Err(ChainError::Halted);
        }
        let now = self.clock.now_secs();
        let mut producer = self.producer.lock();
        let has_txs = !self.pending.lock().is_empty();
        if !producer.should_produce(has_txs, now) {
            return Ok(None);
        }

        let proposer = self.cpv.select_proposer()?;
        let batch: Vec<Transaction> = {
            let mut pending = self.pending.lock();
            let take = pending.len().min(self.config.block.max_txs_per_block);
            pending.drain(..take).collect()
        };

        let outcome = self.dispatcher.apply_batch(&batch);
        if !outcome.halted {
            if let Err(err) = self.verify_invariants() {
                self.dispatcher.halt(err.to_string());
            }
        }
        let halted = outcome.halted || self.dispatcher.is_halted();

        let block = {
            let mut blocks = self.blocks.write();
            let parent = blocks
                .last()
                .ok_or_else(|| ChainError::InvariantViolation("chain has no genesis block".into()))?;
            let block = Block::next(
                parent,
                now,
                proposer.address.clone(),
                applied_hashes(&outcome),
                outcome.failed.iter().map(|f| f.tx_hash.clone()).collect(),
            );
            blocks.push(block.clone());
            block
        };
        producer.record_sealed(block.timestamp);

        let round_outcome = if halted { RoundOutcome::Rejected } else { RoundOutcome::Accepted };
        self.cpv.record_round(&proposer.address, block.hash.clone(), round_outcome);

        if halted {
            error!(
                target: "block",
                height = block.height,
                reason = ?self.dispatcher.halt_reason(),
                "Block sealed on halt"
            );
        } else {
            info!(
                target: "block",
                height = block.height,
                hash = %block.hash,
                proposer = %block.proposer,
                applied = block.tx_hashes.len(),
                failed = block.failed.len(),
                "Block sealed"
            );
        }
        Ok(Some(block))
    }

    /// Cross-engine consistency checks; an error here means corrupted state.
    pub fn verify_invariants(&self) -> Result<()> {
        for info in self.ledgers.token_infos() {
            let ledger = self.ledgers.ledger(&info.symbol)?;
            let state = ledger.read();
            if state.balances_sum() != state.total_supply() {
                return Err(ChainError::InvariantViolation(format!(
                    "{} balances sum to {} but supply is {}",
                    info.symbol,
                    state.balances_sum(),
                    state.total_supply()
                )));
            }
        }
        self.amm.verify_reserves()?;
        self.staking.verify_custody()
    }

    pub fn is_halted(&self) -> bool {
        self.dispatcher.is_halted()
    }

    pub fn get_balance(&self, address: &Address, token: &TokenSymbol) -> Result<Amount> {
        self.ledgers.balance_of(address, token)
    }

    pub fn get_all_balances(&self, address: &Address) -> BTreeMap<TokenSymbol, Amount> {
        self.ledgers.all_balances(address)
    }

    pub fn get_pool(&self, a: &TokenSymbol, b: &TokenSymbol) -> Result<Pool> {
        self.amm.get_pool(a, b)
    }

    pub fn get_swap_quote(&self, from: &TokenSymbol, to: &TokenSymbol, amount_in: Amount) -> Result<SwapResult> {
        self.amm.quote(from, to, amount_in)
    }

    pub fn get_staking_stats(&self) -> StakingStats {
        self.staking.stats()
    }

    pub fn get_consensus_stats(&self) -> ConsensusStats {
        self.cpv.stats()
    }

    pub fn latest_block(&self) -> Block {
        let blocks = self.blocks.read();
        match blocks.last() {
            Some(block) => block.clone(),
            None => Block::genesis(0),
        }
    }

    pub fn height(&self) -> u64 {
        self.blocks.read().len().saturating_sub(1) as u64
    }

    pub fn block(&self, height: u64) -> Option<Block> {
        self.blocks.read().get(height as usize).cloned()
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let latest = self.latest_block();
        let tokens = self.ledgers.token_infos();
        let balances = tokens
            .iter()
            .filter_map(|info| {
                let ledger = self.ledgers.ledger(&info.symbol).ok()?;
                Some((info.symbol.clone(), ledger.balances()))
            })
            .collect();
        NodeSnapshot {
            height: latest.height,
            latest_hash: latest.hash,
            tokens,
            balances,
            pools: self.amm.list_pools(),
            positions: self.staking.positions(),
            validators: self.cpv.validators(),
            nonces: self.dispatcher.nonces(),
            halted: self.dispatcher.halt_reason(),
        }
    }
}

fn applied_hashes(outcome: &BatchOutcome) -> Vec<String> {
    outcome.applied.iter().map(|r| r.tx_hash.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenesisAllocation, DEFAULT_TREASURY};
    use dujyo_primitives::{ManualClock, TxKind};

    fn node() -> (Node, Arc<ManualClock>) {
        let mut config = ChainConfig::default();
        config.genesis.allocations.push(GenesisAllocation {
            address: Address::new("alice"),
            token: TokenSymbol::new("DYO"),
            amount: 5_000,
        });
        let clock = Arc::new(ManualClock::new(1_000));
        (Node::from_config(config, clock.clone()).unwrap(), clock)
    }

    #[test]
    fn test_genesis_state() {
        let (node, _) = node();
        assert_eq!(node.height(), 0);
        assert_eq!(
            node.get_balance(&Address::new("alice"), &TokenSymbol::new("DYO")).unwrap(),
            5_000
        );
        assert_eq!(node.get_consensus_stats().economic_validators, 1);
        node.verify_invariants().unwrap();
    }

    #[test]
    fn test_tick_seals_pending_and_waits_when_idle() {
        let (node, clock) = node();
        assert!(node.tick().unwrap().is_none());

        node.submit(Transaction::new(TxKind::Transfer, "alice", "bob", 100, 0))
            .unwrap();
        node.submit(Transaction::new(TxKind::Transfer, "alice", "bob", 100, 5))
            .unwrap();
        let block = node.tick().unwrap().expect("block with transactions");
        assert_eq!(block.height, 1);
        assert_eq!(block.tx_hashes.len(), 1);
        assert_eq!(block.failed.len(), 1);
        assert_eq!(block.proposer, Address::new(DEFAULT_TREASURY));
        assert_eq!(node.pending_len(), 0);

        assert!(node.tick().unwrap().is_none());
        clock.advance(node.config().block.idle_window_secs);
        let empty = node.tick().unwrap().expect("idle block");
        assert!(empty.is_empty());
        assert_eq!(empty.previous_hash, block.hash);

        let stats = node.get_consensus_stats();
        assert_eq!(stats.total_rounds, 2);
        assert_eq!(stats.recent_rounds[0].block_id, empty.hash);
    }

    #[test]
    fn test_executed_transaction_defers_idle_block() {
        let (node, clock) = node();
        clock.advance(30);
        node.execute(&Transaction::new(TxKind::Transfer, "alice", "bob", 1, 0))
            .unwrap();
        assert!(node.tick().unwrap().is_none());

        clock.advance(29);
        assert!(node.tick().unwrap().is_none());
        clock.advance(1);
        let idle = node.tick().unwrap().expect("idle block after the window");
        assert!(idle.is_empty());
        assert_eq!(idle.height, 1);
    }

    #[test]
    fn test_rejected_execute_does_not_count_as_activity() {
        let (node, clock) = node();
        clock.advance(30);
        assert!(node
            .execute(&Transaction::new(TxKind::Transfer, "alice", "bob", 1, 9))
            .is_err());
        assert!(node.tick().unwrap().is_some());
    }

    #[test]
    fn test_snapshot_serializes() {
        let (node, _) = node();
        node.execute(&Transaction::new(TxKind::Transfer, "alice", "bob", 1, 0))
            .unwrap();
        node.cpv()
            .register_economic(&Address::new("whale"), 40_000 * 10u128.pow(18))
            .unwrap();
        let snapshot = node.snapshot();
        assert_eq!(snapshot.nonces.get(&Address::new("alice")), Some(&1));
        assert_eq!(snapshot.validators.len(), 2);
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: NodeSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_mempool_capacity() {
        let mut config = ChainConfig::default();
        config.block.max_pending = 1;
        let node = Node::from_config(config, Arc::new(ManualClock::new(0))).unwrap();
        node.submit(Transaction::new(TxKind::Transfer, "a", "b", 1, 0)).unwrap();
        assert!(matches!(
            node.submit(Transaction::new(TxKind::Transfer, "a", "b", 1, 1)),
            Err(ChainError::MempoolFull { capacity: 1 })
        ));
    }
}
