//! Per-token balance store.

use crate::config::TokenConfig;
use dujyo_primitives::{checked_add, Address, Amount, ChainError, Result, TokenSymbol};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info};

/// Read model of a token ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: TokenSymbol,
    pub decimals: u8,
    pub total_supply: Amount,
    pub max_supply: Option<Amount>,
    pub mintable: bool,
    pub burnable: bool,
    pub paused: bool,
    pub holders: usize,
}

/// Mutable state of one token. Obtained through [`TokenLedger::write`] or
/// [`lock_pair`]; every method assumes the caller already holds the lock.
#[derive(Debug)]
pub struct LedgerState {
    config: TokenConfig,
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    total_supply: Amount,
    paused: bool,
}

impl LedgerState {
    fn new(config: TokenConfig) -> Self {
        Self {
            config,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            total_supply: 0,
            paused: false,
        }
    }

    pub fn symbol(&self) -> &TokenSymbol {
        &self.config.symbol
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn balance_of(&self, address: &Address) -> Amount {
        self.balances.get(address).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of all balances. Equals `total_supply` unless the ledger is corrupt.
    pub fn balances_sum(&self) -> Amount {
        self.balances
            .values()
            .fold(0u128, |acc, b| acc.saturating_add(*b))
    }

    pub fn ensure_unpaused(&self) -> Result<()> {
        if self.paused {
            return Err(ChainError::ContractPaused(self.config.symbol.clone()));
        }
        Ok(())
    }

    /// Validation half of a staged transfer. Does not touch state.
    pub fn check_transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<()> {
        self.ensure_unpaused()?;
        if amount == 0 {
            return Err(ChainError::InvalidAmount);
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(ChainError::InsufficientBalance {
                token: self.config.symbol.clone(),
                address: from.clone(),
                available,
                required: amount,
            });
        }
        if from != to {
            checked_add(self.balance_of(to), amount, "ledger credit")?;
        }
        Ok(())
    }

    /// Commit half of a staged transfer. Only call after [`check_transfer`](Self::check_transfer)
    /// succeeded under the same lock; a failure here means the ledger is corrupt.
    pub fn commit_transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<()> {
        if from == to {
            return Ok(());
        }
        let from_balance = self.balance_of(from);
        let debited = from_balance.checked_sub(amount).ok_or_else(|| {
            self.corruption(format!(
                "{} balance of {from} would go negative ({from_balance} - {amount})",
                self.config.symbol
            ))
        })?;
        let credited = self.balance_of(to).checked_add(amount).ok_or_else(|| {
            self.corruption(format!("{} balance of {to} overflowed", self.config.symbol))
        })?;

        self.set_balance(from, debited);
        self.set_balance(to, credited);
        Ok(())
    }

    /// Atomic debit-and-credit under the caller's lock.
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<()> {
        self.check_transfer(from, to, amount)?;
        self.commit_transfer(from, to, amount)
    }

    pub fn mint(&mut self, to: &Address, amount: Amount) -> Result<()> {
        self.ensure_unpaused()?;
        if !self.config.mintable {
            return Err(ChainError::NotMintable(self.config.symbol.clone()));
        }
        if amount == 0 {
            return Err(ChainError::InvalidAmount);
        }
        let new_supply = checked_add(self.total_supply, amount, "token supply")?;
        if let Some(cap) = self.config.max_supply {
            if new_supply > cap {
                return Err(ChainError::SupplyCapExceeded {
                    token: self.config.symbol.clone(),
                    cap,
                    requested: new_supply,
                });
            }
        }
        let credited = checked_add(self.balance_of(to), amount, "ledger credit")?;

        self.total_supply = new_supply;
        self.set_balance(to, credited);
        Ok(())
    }

    pub fn burn(&mut self, from: &Address, amount: Amount) -> Result<()> {
        self.ensure_unpaused()?;
        if !self.config.burnable {
            return Err(ChainError::NotBurnable(self.config.symbol.clone()));
        }
        if amount == 0 {
            return Err(ChainError::InvalidAmount);
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(ChainError::InsufficientBalance {
                token: self.config.symbol.clone(),
                address: from.clone(),
                available,
                required: amount,
            });
        }
        let new_supply = self.total_supply.checked_sub(amount).ok_or_else(|| {
            self.corruption(format!("{} supply would go negative", self.config.symbol))
        })?;

        self.total_supply = new_supply;
        self.set_balance(from, available - amount);
        Ok(())
    }

    fn set_balance(&mut self, address: &Address, amount: Amount) {
        if amount == 0 {
            self.balances.remove(address);
        } else {
            self.balances.insert(address.clone(), amount);
        }
    }

    fn corruption(&self, message: String) -> ChainError {
        error!(target: "ledger", token = %self.config.symbol, "{message}");
        ChainError::InvariantViolation(message)
    }

    fn info(&self) -> TokenInfo {
        TokenInfo {
            symbol: self.config.symbol.clone(),
            decimals: self.config.decimals,
            total_supply: self.total_supply,
            max_supply: self.config.max_supply,
            mintable: self.config.mintable,
            burnable: self.config.burnable,
            paused: self.paused,
            holders: self.balances.len(),
        }
    }
}

/// Thread-safe ledger for one token.
#[derive(Debug)]
pub struct TokenLedger {
    symbol: TokenSymbol,
    state: RwLock<LedgerState>,
}

impl TokenLedger {
    /// Create a ledger, crediting `initial_supply` to the owner.
    pub fn new(config: TokenConfig) -> Result<Self> {
        let symbol = config.symbol.clone();
        let mut state = LedgerState::new(config);

        if let Some(initial) = state.config.initial_supply.filter(|amount| *amount > 0) {
            if let Some(cap) = state.config.max_supply {
                if initial > cap {
                    return Err(ChainError::SupplyCapExceeded {
                        token: symbol,
                        cap,
                        requested: initial,
                    });
                }
            }
            let owner = state.config.owner.clone();
            state.total_supply = initial;
            state.set_balance(&owner, initial);
        }

        info!(
            target: "ledger",
            token = %symbol,
            decimals = state.config.decimals,
            supply = state.total_supply,
            "Token ledger created"
        );

        Ok(Self {
            symbol,
            state: RwLock::new(state),
        })
    }

    pub fn symbol(&self) -> &TokenSymbol {
        &self.symbol
    }

    /// Shared access for consistent multi-field reads.
    pub fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read()
    }

    /// Exclusive access for staged multi-step commits.
    pub fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write()
    }

    pub fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<()> {
        self.write().transfer(from, to, amount)?;
        debug!(target: "ledger", token = %self.symbol, %from, %to, amount, "Transfer");
        Ok(())
    }

    pub fn mint(&self, to: &Address, amount: Amount) -> Result<()> {
        let supply = {
            let mut state = self.write();
            state.mint(to, amount)?;
            state.total_supply()
        };
        info!(target: "ledger", token = %self.symbol, %to, amount, supply, "Minted");
        Ok(())
    }

    pub fn burn(&self, from: &Address, amount: Amount) -> Result<()> {
        let supply = {
            let mut state = self.write();
            state.burn(from, amount)?;
            state.total_supply()
        };
        info!(target: "ledger", token = %self.symbol, %from, amount, supply, "Burned");
        Ok(())
    }

    /// Set the amount `spender` may move out of `owner`'s balance. Zero revokes.
    pub fn approve(&self, owner: &Address, spender: &Address, amount: Amount) -> Result<()> {
        let mut state = self.write();
        state.ensure_unpaused()?;
        let key = (owner.clone(), spender.clone());
        if amount == 0 {
            state.allowances.remove(&key);
        } else {
            state.allowances.insert(key, amount);
        }
        debug!(target: "ledger", token = %self.symbol, %owner, %spender, amount, "Approval");
        Ok(())
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.read().allowance(owner, spender)
    }

    /// Delegated transfer. The allowance is checked before the transfer and
    /// decremented only when the transfer succeeds.
    pub fn transfer_from(
        &self,
        from: &Address,
        to: &Address,
        amount: Amount,
        spender: &Address,
    ) -> Result<()> {
        let mut state = self.write();
        state.ensure_unpaused()?;
        if amount == 0 {
            return Err(ChainError::InvalidAmount);
        }
        let allowed = state.allowance(from, spender);
        if allowed < amount {
            return Err(ChainError::InsufficientAllowance {
                token: self.symbol.clone(),
                available: allowed,
                required: amount,
            });
        }

        state.transfer(from, to, amount)?;

        let key = (from.clone(), spender.clone());
        let remaining = allowed - amount;
        if remaining == 0 {
            state.allowances.remove(&key);
        } else {
            state.allowances.insert(key, remaining);
        }
        debug!(target: "ledger", token = %self.symbol, %from, %to, %spender, amount, "Delegated transfer");
        Ok(())
    }

    pub fn pause(&self) {
        self.write().paused = true;
        info!(target: "ledger", token = %self.symbol, "Token paused");
    }

    pub fn unpause(&self) {
        self.write().paused = false;
        info!(target: "ledger", token = %self.symbol, "Token unpaused");
    }

    pub fn is_paused(&self) -> bool {
        self.read().is_paused()
    }

    pub fn balance_of(&self, address: &Address) -> Amount {
        self.read().balance_of(address)
    }

    pub fn total_supply(&self) -> Amount {
        self.read().total_supply()
    }

    pub fn info(&self) -> TokenInfo {
        self.read().info()
    }

    /// Snapshot of all non-zero balances, ordered by address.
    pub fn balances(&self) -> BTreeMap<Address, Amount> {
        self.read()
            .balances
            .iter()
            .map(|(address, amount)| (address.clone(), *amount))
            .collect()
    }
}

/// Write-lock two distinct ledgers in global symbol order, returned in argument order.
pub fn lock_pair<'a>(
    a: &'a TokenLedger,
    b: &'a TokenLedger,
) -> Result<(RwLockWriteGuard<'a, LedgerState>, RwLockWriteGuard<'a, LedgerState>)> {
    if a.symbol == b.symbol {
        return Err(ChainError::IdenticalTokens(a.symbol.clone()));
    }
    if a.symbol < b.symbol {
        let guard_a = a.write();
        let guard_b = b.write();
        Ok((guard_a, guard_b))
    } else {
        let guard_b = b.write();
        let guard_a = a.write();
        Ok((guard_a, guard_b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn addr(s: &str) -> Address {
        Address::new(s)
    }

    fn token(symbol: &str, initial: Amount) -> TokenLedger {
        let config = TokenConfig {
            symbol: TokenSymbol::new(symbol),
            decimals: 0,
            max_supply: Some(1_000_000_000),
            mintable: true,
            burnable: true,
            initial_supply: Some(initial),
            owner: addr("owner"),
        };
        TokenLedger::new(config).unwrap()
    }

    #[test]
    fn test_initial_supply_goes_to_owner() {
        let ledger = token("DYO", 10_000_000);
        assert_eq!(ledger.balance_of(&addr("owner")), 10_000_000);
        assert_eq!(ledger.total_supply(), 10_000_000);
    }

    #[test]
    fn test_initial_supply_above_cap_rejected() {
        let mut config = TokenConfig::native("owner");
        config.initial_supply = Some(config.max_supply.unwrap() + 1);
        assert!(matches!(
            TokenLedger::new(config),
            Err(ChainError::SupplyCapExceeded { .. })
        ));
    }

    #[test]
    fn test_transfer_moves_funds() {
        let ledger = token("DYO", 1_000);
        ledger.transfer(&addr("owner"), &addr("alice"), 400).unwrap();
        assert_eq!(ledger.balance_of(&addr("owner")), 600);
        assert_eq!(ledger.balance_of(&addr("alice")), 400);
        assert_eq!(ledger.read().balances_sum(), ledger.total_supply());
    }

    #[test]
    fn test_transfer_rejections() {
        let ledger = token("DYO", 1_000);
        assert_eq!(
            ledger.transfer(&addr("owner"), &addr("alice"), 0),
            Err(ChainError::InvalidAmount)
        );
        assert!(matches!(
            ledger.transfer(&addr("owner"), &addr("alice"), 1_001),
            Err(ChainError::InsufficientBalance { available: 1_000, required: 1_001, .. })
        ));
        assert_eq!(ledger.balance_of(&addr("owner")), 1_000);
    }

    #[test]
    fn test_self_transfer_is_noop() {
        let ledger = token("DYO", 1_000);
        ledger.transfer(&addr("owner"), &addr("owner"), 500).unwrap();
        assert_eq!(ledger.balance_of(&addr("owner")), 1_000);
    }

    #[test]
    fn test_supply_cap_boundary() {
        let ledger = token("DYO", 10_000_000);
        ledger.mint(&addr("alice"), 990_000_000).unwrap();
        assert_eq!(ledger.total_supply(), 1_000_000_000);

        assert_eq!(
            ledger.mint(&addr("alice"), 1),
            Err(ChainError::SupplyCapExceeded {
                token: TokenSymbol::new("DYO"),
                cap: 1_000_000_000,
                requested: 1_000_000_001,
            })
        );
        assert_eq!(ledger.total_supply(), 1_000_000_000);
    }

    #[test]
    fn test_mint_and_burn_flags() {
        let mut config = TokenConfig::stable("owner");
        config.mintable = false;
        config.burnable = false;
        config.initial_supply = Some(100);
        let ledger = TokenLedger::new(config).unwrap();

        assert!(matches!(ledger.mint(&addr("a"), 1), Err(ChainError::NotMintable(_))));
        assert!(matches!(ledger.burn(&addr("owner"), 1), Err(ChainError::NotBurnable(_))));
    }

    #[test]
    fn test_burn_reduces_supply() {
        let ledger = token("DYO", 1_000);
        ledger.burn(&addr("owner"), 250).unwrap();
        assert_eq!(ledger.total_supply(), 750);
        assert!(matches!(
            ledger.burn(&addr("owner"), 751),
            Err(ChainError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.burn(&addr("owner"), 0), Err(ChainError::InvalidAmount));
    }

    #[test]
    fn test_pause_freezes_every_mutation() {
        let ledger = token("DYO", 1_000);
        ledger.pause();

        let paused = Err(ChainError::ContractPaused(TokenSymbol::new("DYO")));
        assert_eq!(ledger.transfer(&addr("owner"), &addr("a"), 1), paused);
        assert_eq!(ledger.approve(&addr("owner"), &addr("a"), 1), paused);
        assert_eq!(
            ledger.transfer_from(&addr("owner"), &addr("a"), 1, &addr("a")),
            paused
        );
        assert_eq!(ledger.mint(&addr("a"), 1), paused);
        assert_eq!(ledger.burn(&addr("owner"), 1), paused);

        ledger.unpause();
        ledger.transfer(&addr("owner"), &addr("a"), 1).unwrap();
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let ledger = token("DYO", 1_000);
        let (owner, spender, bob) = (addr("owner"), addr("dex"), addr("bob"));

        ledger.approve(&owner, &spender, 300).unwrap();
        assert_eq!(ledger.allowance(&owner, &spender), 300);

        ledger.transfer_from(&owner, &bob, 200, &spender).unwrap();
        assert_eq!(ledger.allowance(&owner, &spender), 100);
        assert_eq!(ledger.balance_of(&bob), 200);

        assert!(matches!(
            ledger.transfer_from(&owner, &bob, 101, &spender),
            Err(ChainError::InsufficientAllowance { available: 100, required: 101, .. })
        ));
    }

    #[test]
    fn test_failed_transfer_from_keeps_allowance() {
        let ledger = token("DYO", 50);
        let (owner, spender) = (addr("owner"), addr("dex"));
        ledger.approve(&owner, &spender, 500).unwrap();

        assert!(matches!(
            ledger.transfer_from(&owner, &addr("bob"), 100, &spender),
            Err(ChainError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.allowance(&owner, &spender), 500);
    }

    #[test]
    fn test_lock_pair_rejects_same_token() {
        let a = token("DYO", 1);
        assert!(matches!(lock_pair(&a, &a), Err(ChainError::IdenticalTokens(_))));
    }

    #[test]
    fn test_lock_pair_opposite_orders_do_not_deadlock() {
        let a = Arc::new(token("DYO", 1_000_000));
        let b = Arc::new(token("DYS", 1_000_000));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let (a, b) = (a.clone(), b.clone());
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let (mut first, mut second) = if i % 2 == 0 {
                            lock_pair(&a, &b).unwrap()
                        } else {
                            lock_pair(&b, &a).unwrap()
                        };
                        first.transfer(&addr("owner"), &addr("x"), 1).unwrap();
                        second.transfer(&addr("owner"), &addr("x"), 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(a.balance_of(&addr("x")), 4_000);
        assert_eq!(b.balance_of(&addr("x")), 4_000);
    }
}
