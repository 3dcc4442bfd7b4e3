//! Dujyo chain state: genesis configuration, the transaction dispatcher,
//! block sealing and the [`Node`] facade over the ledger, AMM, staking and
//! CPV engines.

pub mod block;
pub mod config;
pub mod dispatcher;
pub mod node;

pub use block::{Block, BlockProducer};
pub use config::{BlockConfig, ChainConfig, GenesisAllocation, GenesisConfig, GenesisValidator, DEFAULT_TREASURY};
pub use dispatcher::{BatchOutcome, Dispatcher, TxFailure, TxOutcome, TxReceipt};
pub use node::{Node, NodeSnapshot};

/// Genesis validators carry CPV evidence.
pub use dujyo_cpv::Evidence;
