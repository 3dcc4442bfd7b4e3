//! Pool engine: the registry of pools and every state-changing AMM operation.
//!
//! Lock order is pool map, then a single pool, then ledgers via
//! [`lock_pair`]. The map lock is never taken while a pool lock is held.

use crate::config::AmmConfig;
use crate::pool::{pool_id, Pool, SwapResult};
use dujyo_ledger::{lock_pair, LedgerRegistry};
use dujyo_primitives::math;
use dujyo_primitives::{Address, Amount, Bps, ChainError, Result, TokenSymbol};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a liquidity deposit or withdrawal. Token amounts follow the
/// caller's argument order, not the pool's canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityReceipt {
    pub pool_id: String,
    pub shares: Amount,
    pub token_x: TokenSymbol,
    pub amount_x: Amount,
    pub token_y: TokenSymbol,
    pub amount_y: Amount,
}

pub struct PoolEngine {
    config: AmmConfig,
    ledgers: Arc<LedgerRegistry>,
    pools: RwLock<BTreeMap<String, Arc<Mutex<Pool>>>>,
    paused: RwLock<Option<String>>,
}

impl PoolEngine {
    pub fn new(config: AmmConfig, ledgers: Arc<LedgerRegistry>) -> Self {
        Self {
            config,
            ledgers,
            pools: RwLock::new(BTreeMap::new()),
            paused: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &AmmConfig {
        &self.config
    }

    /// Create an empty pool with an explicit fee.
    pub fn create_pool(&self, x: &TokenSymbol, y: &TokenSymbol, fee_bps: Bps) -> Result<Pool> {
        if fee_bps > self.config.max_fee_bps {
            return Err(ChainError::InvalidParameter("pool fee above maximum"));
        }
        self.ledgers.ledger(x)?;
        self.ledgers.ledger(y)?;
        let pool = Pool::new(x.clone(), y.clone(), fee_bps)?;

        let mut pools = self.pools.write();
        if pools.contains_key(&pool.id) {
            return Err(ChainError::PoolAlreadyExists(pool.id));
        }
        pools.insert(pool.id.clone(), Arc::new(Mutex::new(pool.clone())));
        info!(target: "amm", pool = %pool.id, fee_bps, "Pool created");
        Ok(pool)
    }

    /// Deposit both tokens and mint LP shares. The first deposit into an
    /// unknown pair creates the pool with the default fee.
    pub fn add_liquidity(
        &self,
        provider: &Address,
        x: &TokenSymbol,
        y: &TokenSymbol,
        amount_x: Amount,
        amount_y: Amount,
    ) -> Result<LiquidityReceipt> {
        self.ensure_running()?;
        if x == y {
            return Err(ChainError::IdenticalTokens(x.clone()));
        }
        if amount_x == 0 || amount_y == 0 {
            return Err(ChainError::InvalidAmount);
        }
        self.ledgers.ledger(x)?;
        self.ledgers.ledger(y)?;

        let (handle, created) = self.pool_or_create(x, y)?;
        let result = self.deposit(&handle, provider, x, y, amount_x, amount_y);
        if result.is_err() && created {
            self.discard_if_empty(&pool_id(x, y), &handle);
        }
        result
    }

    fn deposit(
        &self,
        handle: &Mutex<Pool>,
        provider: &Address,
        x: &TokenSymbol,
        y: &TokenSymbol,
        amount_x: Amount,
        amount_y: Amount,
    ) -> Result<LiquidityReceipt> {
        let mut pool = handle.lock();
        if !pool.active {
            return Err(ChainError::PoolInactive(pool.id.clone()));
        }

        let x_is_a = pool.is_token_a(x)?;
        let (amount_a, amount_b) = if x_is_a { (amount_x, amount_y) } else { (amount_y, amount_x) };
        let shares = pool.shares_for_deposit(amount_a, amount_b)?;
        if shares < self.config.min_liquidity_shares {
            return Err(ChainError::LiquidityTooSmall {
                minted: shares,
                minimum: self.config.min_liquidity_shares,
            });
        }
        let new_reserve_a = math::checked_add(pool.reserve_a, amount_a, "pool reserve")?;
        let new_reserve_b = math::checked_add(pool.reserve_b, amount_b, "pool reserve")?;

        let ledger_x = self.ledgers.ledger(x)?;
        let ledger_y = self.ledgers.ledger(y)?;
        let pool_address = pool.address();
        let (mut state_x, mut state_y) = lock_pair(&ledger_x, &ledger_y)?;
        state_x.check_transfer(provider, &pool_address, amount_x)?;
        state_y.check_transfer(provider, &pool_address, amount_y)?;

        pool.credit_shares(provider, shares)?;
        state_x.commit_transfer(provider, &pool_address, amount_x)?;
        state_y.commit_transfer(provider, &pool_address, amount_y)?;
        pool.reserve_a = new_reserve_a;
        pool.reserve_b = new_reserve_b;

        info!(
            target: "amm",
            pool = %pool.id,
            provider = %provider,
            shares,
            reserve_a = pool.reserve_a,
            reserve_b = pool.reserve_b,
            "Liquidity added"
        );
        Ok(LiquidityReceipt {
            pool_id: pool.id.clone(),
            shares,
            token_x: x.clone(),
            amount_x,
            token_y: y.clone(),
            amount_y,
        })
    }

    /// Burn `shares` and pay out the pro-rata reserves. Allowed on inactive
    /// pools so providers can always exit.
    pub fn remove_liquidity(
        &self,
        provider: &Address,
        x: &TokenSymbol,
        y: &TokenSymbol,
        shares: Amount,
    ) -> Result<LiquidityReceipt> {
        self.ensure_running()?;
        if shares == 0 {
            return Err(ChainError::InvalidAmount);
        }
        let handle = self.pool_handle(x, y)?;
        let mut pool = handle.lock();

        let held = pool.shares_of(provider);
        if shares > held {
            return Err(ChainError::InsufficientLiquidity(format!(
                "{provider} holds {held} shares of {}, {shares} requested",
                pool.id
            )));
        }
        let (out_a, out_b) = pool.withdrawal_for(shares)?;
        if out_a == 0 && out_b == 0 {
            return Err(ChainError::InsufficientLiquidity(format!(
                "{shares} shares of {} redeem to nothing",
                pool.id
            )));
        }
        let (Some(new_reserve_a), Some(new_reserve_b)) =
            (pool.reserve_a.checked_sub(out_a), pool.reserve_b.checked_sub(out_b))
        else {
            return Err(ChainError::InvariantViolation(format!(
                "pool {} withdrawal exceeds reserves",
                pool.id
            )));
        };

        let ledger_a = self.ledgers.ledger(&pool.token_a)?;
        let ledger_b = self.ledgers.ledger(&pool.token_b)?;
        let pool_address = pool.address();
        let (mut state_a, mut state_b) = lock_pair(&ledger_a, &ledger_b)?;
        if out_a > 0 {
            state_a.check_transfer(&pool_address, provider, out_a)?;
        }
        if out_b > 0 {
            state_b.check_transfer(&pool_address, provider, out_b)?;
        }

        pool.debit_shares(provider, shares)?;
        if out_a > 0 {
            state_a.commit_transfer(&pool_address, provider, out_a)?;
        }
        if out_b > 0 {
            state_b.commit_transfer(&pool_address, provider, out_b)?;
        }
        pool.reserve_a = new_reserve_a;
        pool.reserve_b = new_reserve_b;

        info!(
            target: "amm",
            pool = %pool.id,
            provider = %provider,
            shares,
            out_a,
            out_b,
            "Liquidity removed"
        );
        let (amount_x, amount_y) = if pool.is_token_a(x)? { (out_a, out_b) } else { (out_b, out_a) };
        Ok(LiquidityReceipt {
            pool_id: pool.id.clone(),
            shares,
            token_x: x.clone(),
            amount_x,
            token_y: y.clone(),
            amount_y,
        })
    }

    /// Swap `amount_in` of `from` for `to`. Checks run in order: pool state,
    /// amount, trader balance, slippage, minimum output, pool reserve.
    pub fn swap(
        &self,
        trader: &Address,
        from: &TokenSymbol,
        to: &TokenSymbol,
        amount_in: Amount,
        min_amount_out: Amount,
        max_slippage_bps: Option<Bps>,
    ) -> Result<SwapResult> {
        self.ensure_running()?;
        if from == to {
            return Err(ChainError::IdenticalTokens(from.clone()));
        }
        let handle = self.pool_handle(from, to)?;
        let mut pool = handle.lock();
        if !pool.active {
            return Err(ChainError::PoolInactive(pool.id.clone()));
        }
        if amount_in == 0 {
            return Err(ChainError::InvalidAmount);
        }

        let ledger_in = self.ledgers.ledger(from)?;
        let ledger_out = self.ledgers.ledger(to)?;
        let pool_address = pool.address();
        let (mut state_in, mut state_out) = lock_pair(&ledger_in, &ledger_out)?;
        state_in.check_transfer(trader, &pool_address, amount_in)?;

        let quote = pool.quote(from, amount_in)?;
        let max_slippage_bps = max_slippage_bps.unwrap_or(self.config.default_max_slippage_bps);
        if quote.slippage_bps > max_slippage_bps {
            return Err(ChainError::SlippageExceeded {
                actual_bps: quote.slippage_bps,
                max_bps: max_slippage_bps,
            });
        }
        if quote.amount_out < min_amount_out {
            return Err(ChainError::OutputBelowMinimum {
                amount_out: quote.amount_out,
                min_amount_out,
            });
        }
        if quote.amount_out == 0 {
            return Err(ChainError::InsufficientLiquidity(format!(
                "swap of {amount_in} {from} on {} yields nothing",
                pool.id
            )));
        }
        state_out.check_transfer(&pool_address, trader, quote.amount_out)?;

        state_in.commit_transfer(trader, &pool_address, amount_in)?;
        state_out.commit_transfer(&pool_address, trader, quote.amount_out)?;
        pool.apply_swap(from, amount_in, quote.amount_out)?;

        info!(
            target: "amm",
            pool = %pool.id,
            trader = %trader,
            from = %from,
            amount_in,
            amount_out = quote.amount_out,
            fee = quote.fee,
            price_impact_bps = quote.price_impact_bps,
            "Swap executed"
        );
        Ok(quote)
    }

    /// Price a swap against current reserves without executing it.
    pub fn quote(&self, from: &TokenSymbol, to: &TokenSymbol, amount_in: Amount) -> Result<SwapResult> {
        let handle = self.pool_handle(from, to)?;
        let pool = handle.lock();
        let quote = pool.quote(from, amount_in)?;
        debug!(target: "amm", pool = %pool.id, amount_in, amount_out = quote.amount_out, "Swap quoted");
        Ok(quote)
    }

    pub fn get_pool(&self, x: &TokenSymbol, y: &TokenSymbol) -> Result<Pool> {
        Ok(self.pool_handle(x, y)?.lock().clone())
    }

    pub fn list_pools(&self) -> Vec<Pool> {
        let handles: Vec<Arc<Mutex<Pool>>> = self.pools.read().values().cloned().collect();
        handles.iter().map(|handle| handle.lock().clone()).collect()
    }

    pub fn lp_shares(&self, x: &TokenSymbol, y: &TokenSymbol, provider: &Address) -> Amount {
        self.pool_handle(x, y)
            .map(|handle| handle.lock().shares_of(provider))
            .unwrap_or(0)
    }

    /// Enable or disable swaps and deposits on one pool.
    pub fn set_pool_active(&self, x: &TokenSymbol, y: &TokenSymbol, active: bool) -> Result<()> {
        let handle = self.pool_handle(x, y)?;
        let mut pool = handle.lock();
        pool.active = active;
        info!(target: "amm", pool = %pool.id, active, "Pool status changed");
        Ok(())
    }

    /// Emergency stop for every pool.
    pub fn pause(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(target: "amm", reason = %reason, "AMM paused");
        *self.paused.write() = Some(reason);
    }

    pub fn resume(&self) {
        *self.paused.write() = None;
        info!(target: "amm", "AMM resumed");
    }

    pub fn paused_reason(&self) -> Option<String> {
        self.paused.read().clone()
    }

    /// Cross-check every pool against the ledgers: the pool account must hold
    /// at least its recorded reserves and provider shares must sum to the total.
    pub fn verify_reserves(&self) -> Result<()> {
        let handles: Vec<Arc<Mutex<Pool>>> = self.pools.read().values().cloned().collect();
        for handle in handles {
            let pool = handle.lock();
            let address = pool.address();
            for (token, reserve) in [(&pool.token_a, pool.reserve_a), (&pool.token_b, pool.reserve_b)] {
                let held = self.ledgers.ledger(token)?.balance_of(&address);
                if held < reserve {
                    return Err(ChainError::InvariantViolation(format!(
                        "pool {} records {reserve} {token} but holds {held}",
                        pool.id
                    )));
                }
            }
            let provider_total: Amount = pool.providers.values().sum();
            if provider_total != pool.total_shares {
                return Err(ChainError::InvariantViolation(format!(
                    "pool {} provider shares {provider_total} != total {}",
                    pool.id, pool.total_shares
                )));
            }
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        match self.paused.read().as_ref() {
            Some(reason) => Err(ChainError::AmmPaused(reason.clone())),
            None => Ok(()),
        }
    }

    fn pool_handle(&self, x: &TokenSymbol, y: &TokenSymbol) -> Result<Arc<Mutex<Pool>>> {
        let id = pool_id(x, y);
        self.pools
            .read()
            .get(&id)
            .cloned()
            .ok_or(ChainError::PoolNotFound(id))
    }

    fn pool_or_create(&self, x: &TokenSymbol, y: &TokenSymbol) -> Result<(Arc<Mutex<Pool>>, bool)> {
        if let Ok(handle) = self.pool_handle(x, y) {
            return Ok((handle, false));
        }
        let pool = Pool::new(x.clone(), y.clone(), self.config.default_fee_bps)?;
        let mut pools = self.pools.write();
        if let Some(existing) = pools.get(&pool.id) {
            return Ok((existing.clone(), false));
        }
        let id = pool.id.clone();
        let handle = Arc::new(Mutex::new(pool));
        pools.insert(id.clone(), handle.clone());
        info!(target: "amm", pool = %id, fee_bps = self.config.default_fee_bps, "Pool created on first deposit");
        Ok((handle, true))
    }

    /// Drop a pool created by a deposit that then failed.
    fn discard_if_empty(&self, id: &str, handle: &Arc<Mutex<Pool>>) {
        let mut pools = self.pools.write();
        let same = pools.get(id).is_some_and(|current| Arc::ptr_eq(current, handle));
        if same && handle.lock().total_shares == 0 {
            pools.remove(id);
            debug!(target: "amm", pool = %id, "Discarded empty pool");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dujyo_ledger::TokenConfig;

    fn token(symbol: &str) -> TokenConfig {
        TokenConfig {
            symbol: TokenSymbol::new(symbol),
            decimals: 0,
            max_supply: None,
            mintable: true,
            burnable: true,
            initial_supply: Some(10_000_000),
            owner: Address::new("alice"),
        }
    }

    fn setup() -> (PoolEngine, Arc<LedgerRegistry>) {
        let ledgers = Arc::new(LedgerRegistry::new());
        ledgers.register(token("AAA")).unwrap();
        ledgers.register(token("BBB")).unwrap();
        (PoolEngine::new(AmmConfig::default(), ledgers.clone()), ledgers)
    }

    fn sym(s: &str) -> TokenSymbol {
        TokenSymbol::new(s)
    }

    fn alice() -> Address {
        Address::new("alice")
    }

    #[test]
    fn test_first_deposit_creates_pool() {
        let (engine, ledgers) = setup();
        let receipt = engine
            .add_liquidity(&alice(), &sym("BBB"), &sym("AAA"), 400_000, 100_000)
            .unwrap();
        assert_eq!(receipt.pool_id, "AAA/BBB");
        assert_eq!(receipt.shares, 200_000);

        let pool = engine.get_pool(&sym("AAA"), &sym("BBB")).unwrap();
        assert_eq!(pool.reserve_a, 100_000);
        assert_eq!(pool.reserve_b, 400_000);
        assert_eq!(pool.fee_bps, 30);
        assert_eq!(
            ledgers.balance_of(&pool.address(), &sym("AAA")).unwrap(),
            100_000
        );
        engine.verify_reserves().unwrap();
    }

    #[test]
    fn test_failed_first_deposit_leaves_no_pool() {
        let (engine, _) = setup();
        let err = engine
            .add_liquidity(&Address::new("bob"), &sym("AAA"), &sym("BBB"), 100_000, 100_000)
            .unwrap_err();
        assert!(matches!(err, ChainError::InsufficientBalance { .. }));
        assert!(engine.list_pools().is_empty());

        let err = engine
            .add_liquidity(&alice(), &sym("AAA"), &sym("BBB"), 10, 10)
            .unwrap_err();
        assert!(matches!(err, ChainError::LiquidityTooSmall { minted: 10, .. }));
        assert!(engine.list_pools().is_empty());
    }

    #[test]
    fn test_swap_reference_example() {
        let (engine, ledgers) = setup();
        engine
            .add_liquidity(&alice(), &sym("AAA"), &sym("BBB"), 100_000, 100_000)
            .unwrap();

        let result = engine
            .swap(&alice(), &sym("AAA"), &sym("BBB"), 1_000, 980, None)
            .unwrap();
        assert_eq!(result.fee, 3);
        assert_eq!(result.amount_out, 987);

        let pool = engine.get_pool(&sym("AAA"), &sym("BBB")).unwrap();
        assert_eq!(pool.reserve_a, 101_000);
        assert_eq!(pool.reserve_b, 99_013);
        assert_eq!(
            ledgers.balance_of(&alice(), &sym("BBB")).unwrap(),
            10_000_000 - 100_000 + 987
        );
        engine.verify_reserves().unwrap();
    }

    #[test]
    fn test_swap_failures_leave_state_untouched() {
        let (engine, ledgers) = setup();
        engine
            .add_liquidity(&alice(), &sym("AAA"), &sym("BBB"), 1_000, 1_000_000)
            .unwrap();
        let before = engine.get_pool(&sym("AAA"), &sym("BBB")).unwrap();
        let balance = ledgers.balance_of(&alice(), &sym("AAA")).unwrap();

        let err = engine
            .swap(&alice(), &sym("AAA"), &sym("BBB"), 20, 0, Some(100))
            .unwrap_err();
        assert!(matches!(err, ChainError::SlippageExceeded { actual_bps: 196, max_bps: 100 }));

        let err = engine
            .swap(&alice(), &sym("AAA"), &sym("BBB"), 20, 19_608, Some(500))
            .unwrap_err();
        assert!(matches!(err, ChainError::OutputBelowMinimum { amount_out: 19_607, .. }));

        let err = engine
            .swap(&Address::new("bob"), &sym("AAA"), &sym("BBB"), 20, 0, None)
            .unwrap_err();
        assert!(matches!(err, ChainError::InsufficientBalance { .. }));

        assert_eq!(engine.get_pool(&sym("AAA"), &sym("BBB")).unwrap(), before);
        assert_eq!(ledgers.balance_of(&alice(), &sym("AAA")).unwrap(), balance);
    }

    #[test]
    fn test_swap_requires_existing_active_pool() {
        let (engine, _) = setup();
        assert!(matches!(
            engine.swap(&alice(), &sym("AAA"), &sym("BBB"), 10, 0, None),
            Err(ChainError::PoolNotFound(_))
        ));

        engine
            .add_liquidity(&alice(), &sym("AAA"), &sym("BBB"), 100_000, 100_000)
            .unwrap();
        engine.set_pool_active(&sym("AAA"), &sym("BBB"), false).unwrap();
        assert!(matches!(
            engine.swap(&alice(), &sym("AAA"), &sym("BBB"), 10, 0, None),
            Err(ChainError::PoolInactive(_))
        ));
        // providers can still exit an inactive pool
        engine
            .remove_liquidity(&alice(), &sym("AAA"), &sym("BBB"), 50_000)
            .unwrap();
    }

    #[test]
    fn test_pause_blocks_everything() {
        let (engine, _) = setup();
        engine
            .add_liquidity(&alice(), &sym("AAA"), &sym("BBB"), 100_000, 100_000)
            .unwrap();
        engine.pause("oracle incident");
        assert!(matches!(
            engine.swap(&alice(), &sym("AAA"), &sym("BBB"), 10, 0, None),
            Err(ChainError::AmmPaused(reason)) if reason == "oracle incident"
        ));
        assert!(engine
            .remove_liquidity(&alice(), &sym("AAA"), &sym("BBB"), 1)
            .is_err());
        engine.resume();
        assert!(engine.swap(&alice(), &sym("AAA"), &sym("BBB"), 1_000, 0, None).is_ok());
    }

    #[test]
    fn test_add_then_remove_returns_deposit() {
        let (engine, ledgers) = setup();
        let bob = Address::new("bob");
        ledgers.ledger(&sym("AAA")).unwrap().transfer(&alice(), &bob, 50_000).unwrap();
        ledgers.ledger(&sym("BBB")).unwrap().transfer(&alice(), &bob, 50_000).unwrap();

        engine
            .add_liquidity(&alice(), &sym("AAA"), &sym("BBB"), 100_000, 400_000)
            .unwrap();
        let receipt = engine
            .add_liquidity(&bob, &sym("AAA"), &sym("BBB"), 10_000, 40_000)
            .unwrap();
        assert_eq!(receipt.shares, 20_000);
        assert_eq!(engine.lp_shares(&sym("AAA"), &sym("BBB"), &bob), receipt.shares);

        let back = engine
            .remove_liquidity(&bob, &sym("BBB"), &sym("AAA"), receipt.shares)
            .unwrap();
        assert_eq!(back.token_x, sym("BBB"));
        assert_eq!(back.amount_x, 40_000);
        assert_eq!(back.amount_y, 10_000);
        assert_eq!(ledgers.balance_of(&bob, &sym("AAA")).unwrap(), 50_000);
        assert_eq!(engine.lp_shares(&sym("AAA"), &sym("BBB"), &bob), 0);

        assert!(matches!(
            engine.remove_liquidity(&bob, &sym("AAA"), &sym("BBB"), 1),
            Err(ChainError::InsufficientLiquidity(_))
        ));
        engine.verify_reserves().unwrap();
    }

    #[test]
    fn test_create_pool_rules() {
        let (engine, _) = setup();
        assert!(matches!(
            engine.create_pool(&sym("AAA"), &sym("BBB"), 5_000),
            Err(ChainError::InvalidParameter(_))
        ));
        engine.create_pool(&sym("AAA"), &sym("BBB"), 100).unwrap();
        assert!(matches!(
            engine.create_pool(&sym("BBB"), &sym("AAA"), 100),
            Err(ChainError::PoolAlreadyExists(_))
        ));
        assert!(matches!(
            engine.create_pool(&sym("AAA"), &sym("ZZZ"), 100),
            Err(ChainError::UnknownToken(_))
        ));
    }

    #[test]
    fn test_paused_ledger_blocks_swap() {
        let (engine, ledgers) = setup();
        engine
            .add_liquidity(&alice(), &sym("AAA"), &sym("BBB"), 100_000, 100_000)
            .unwrap();
        ledgers.ledger(&sym("BBB")).unwrap().pause();
        assert!(matches!(
            engine.swap(&alice(), &sym("AAA"), &sym("BBB"), 1_000, 0, None),
            Err(ChainError::ContractPaused(_))
        ));
    }
}
