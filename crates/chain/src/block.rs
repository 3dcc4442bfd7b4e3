//! Sealed blocks and the idle-window production rule.

use crate::config::BlockConfig;
use blake3::Hasher;
use dujyo_primitives::{Address, Timestamp};
use serde::{Deserialize, Serialize};

const HASH_DOMAIN: &[u8] = b"DUJYO_BLOCK_V1";

/// Proposer recorded on the genesis block.
pub const GENESIS_PROPOSER: &str = "genesis";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub timestamp: Timestamp,
    pub previous_hash: String,
    pub hash: String,
    pub proposer: Address,
    /// Hashes of the transactions applied in this block, in order.
    pub tx_hashes: Vec<String>,
    /// Hashes of transactions that were attempted but rejected.
    pub failed: Vec<String>,
}

impl Block {
    pub fn genesis(timestamp: Timestamp) -> Self {
        Self::seal(
            0,
            timestamp,
            "0".repeat(64),
            Address::new(GENESIS_PROPOSER),
            Vec::new(),
            Vec::new(),
        )
    }

    /// Build the block following `parent`.
    pub fn next(
        parent: &Block,
        timestamp: Timestamp,
        proposer: Address,
        tx_hashes: Vec<String>,
        failed: Vec<String>,
    ) -> Self {
        Self::seal(
            parent.height + 1,
            timestamp.max(parent.timestamp),
            parent.hash.clone(),
            proposer,
            tx_hashes,
            failed,
        )
    }

    fn seal(
        height: u64,
        timestamp: Timestamp,
        previous_hash: String,
        proposer: Address,
        tx_hashes: Vec<String>,
        failed: Vec<String>,
    ) -> Self {
        let hash = Self::compute_hash(height, timestamp, &previous_hash, &proposer, &tx_hashes, &failed);
        Self {
            height,
            timestamp,
            previous_hash,
            hash,
            proposer,
            tx_hashes,
            failed,
        }
    }

    pub fn compute_hash(
        height: u64,
        timestamp: Timestamp,
        previous_hash: &str,
        proposer: &Address,
        tx_hashes: &[String],
        failed: &[String],
    ) -> String {
        let mut hasher = Hasher::new();
        hasher.update(HASH_DOMAIN);
        hasher.update(&height.to_le_bytes());
        hasher.update(&timestamp.to_le_bytes());
        hash_str(&mut hasher, previous_hash);
        hash_str(&mut hasher, proposer.as_str());
        for list in [tx_hashes, failed] {
            hasher.update(&(list.len() as u64).to_le_bytes());
            for tx in list {
                hash_str(&mut hasher, tx);
            }
        }
        hex::encode(hasher.finalize().as_bytes())
    }

    /// Whether `hash` matches the header fields.
    pub fn verify_hash(&self) -> bool {
        self.hash
            == Self::compute_hash(
                self.height,
                self.timestamp,
                &self.previous_hash,
                &self.proposer,
                &self.tx_hashes,
                &self.failed,
            )
    }

    pub fn is_empty(&self) -> bool {
        self.tx_hashes.is_empty() && self.failed.is_empty()
    }
}

fn hash_str(hasher: &mut Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Decides when the externally driven timer may seal a block.
#[derive(Debug, Clone)]
pub struct BlockProducer {
    config: BlockConfig,
    last_sealed_at: Timestamp,
    /// Last transaction applied outside block production.
    last_activity_at: Timestamp,
}

impl BlockProducer {
    pub fn new(config: BlockConfig, genesis_at: Timestamp) -> Self {
        Self {
            config,
            last_sealed_at: genesis_at,
            last_activity_at: genesis_at,
        }
    }

    pub fn config(&self) -> &BlockConfig {
        &self.config
    }

    /// Blocks with transactions are always produced; an empty block only once
    /// the idle window has passed since the last sealed block and the last
    /// processed transaction.
    pub fn should_produce(&self, has_txs: bool, now: Timestamp) -> bool {
        let idle_since = self.last_sealed_at.max(self.last_activity_at);
        has_txs || now.saturating_sub(idle_since) >= self.config.idle_window_secs
    }

    pub fn record_sealed(&mut self, at: Timestamp) {
        self.last_sealed_at = self.last_sealed_at.max(at);
    }

    pub fn record_activity(&mut self, at: Timestamp) {
        self.last_activity_at = self.last_activity_at.max(at);
    }

    pub fn last_sealed_at(&self) -> Timestamp {
        self.last_sealed_at
    }
}
