//! Symbol → ledger registry shared by the pool engine, staking engine and dispatcher.

use crate::config::TokenConfig;
use crate::token::{TokenInfo, TokenLedger};
use dujyo_primitives::{Address, Amount, ChainError, Result, TokenSymbol};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
pub struct LedgerRegistry {
    ledgers: RwLock<BTreeMap<TokenSymbol, Arc<TokenLedger>>>,
}

impl LedgerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, config: TokenConfig) -> Result<Arc<TokenLedger>> {
        let mut ledgers = self.ledgers.write();
        if ledgers.contains_key(&config.symbol) {
            return Err(ChainError::TokenAlreadyRegistered(config.symbol));
        }
        let symbol = config.symbol.clone();
        let ledger = Arc::new(TokenLedger::new(config)?);
        ledgers.insert(symbol.clone(), ledger.clone());
        info!(target: "ledger", token = %symbol, tokens = ledgers.len(), "Token registered");
        Ok(ledger)
    }

    pub fn ledger(&self, symbol: &TokenSymbol) -> Result<Arc<TokenLedger>> {
        self.ledgers
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| ChainError::UnknownToken(symbol.clone()))
    }

    pub fn contains(&self, symbol: &TokenSymbol) -> bool {
        self.ledgers.read().contains_key(symbol)
    }

    pub fn symbols(&self) -> Vec<TokenSymbol> {
        self.ledgers.read().keys().cloned().collect()
    }

    pub fn balance_of(&self, address: &Address, symbol: &TokenSymbol) -> Result<Amount> {
        Ok(self.ledger(symbol)?.balance_of(address))
    }

    /// Non-zero balances of `address` across every registered token.
    pub fn all_balances(&self, address: &Address) -> BTreeMap<TokenSymbol, Amount> {
        let ledgers: Vec<Arc<TokenLedger>> = self.ledgers.read().values().cloned().collect();
        ledgers
            .iter()
            .filter_map(|ledger| {
                let balance = ledger.balance_of(address);
                (balance > 0).then(|| (ledger.symbol().clone(), balance))
            })
            .collect()
    }

    pub fn token_infos(&self) -> Vec<TokenInfo> {
        let ledgers: Vec<Arc<TokenLedger>> = self.ledgers.read().values().cloned().collect();
        ledgers.iter().map(|ledger| ledger.info()).collect()
    }
}
