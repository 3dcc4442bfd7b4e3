//! Pool state and the pure constant-product math.

use dujyo_primitives::math::{self, BPS_DENOM};
use dujyo_primitives::{Address, Amount, Bps, ChainError, Result, TokenSymbol};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical pool id: the two symbols in sorted order, joined by `/`.
pub fn pool_id(a: &TokenSymbol, b: &TokenSymbol) -> String {
    if a <= b {
        format!("{a}/{b}")
    } else {
        format!("{b}/{a}")
    }
}

/// Outcome (or quote) of a single swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapResult {
    pub amount_in: Amount,
    /// Fee kept by the pool, in the input token.
    pub fee: Amount,
    pub amount_in_after_fee: Amount,
    pub amount_out: Amount,
    /// Relative move of the pool's spot price caused by the trade.
    pub price_impact_bps: Bps,
    /// Shortfall of `amount_out` against the pre-trade spot price, fee included.
    pub slippage_bps: Bps,
}

/// Price a swap of `amount_in` against `(reserve_in, reserve_out)`.
///
/// `amount_out = floor(after_fee * reserve_out / (reserve_in + after_fee))`
/// where `after_fee = amount_in - floor(amount_in * fee_bps / 10_000)`.
pub fn quote_swap(reserve_in: Amount, reserve_out: Amount, amount_in: Amount, fee_bps: Bps) -> Result<SwapResult> {
    if amount_in == 0 {
        return Err(ChainError::InvalidAmount);
    }
    if reserve_in == 0 || reserve_out == 0 {
        return Err(ChainError::InsufficientLiquidity("pool has no reserves".into()));
    }

    let fee = math::bps_of(amount_in, fee_bps)?;
    let amount_in_after_fee = amount_in - fee;
    let denom = math::checked_add(reserve_in, amount_in_after_fee, "swap denominator")?;
    let amount_out = math::mul_div(amount_in_after_fee, reserve_out, denom)?;

    let new_reserve_in = math::checked_add(reserve_in, amount_in, "swap reserve_in")?;
    let new_reserve_out = reserve_out.saturating_sub(amount_out);

    // spot before = reserve_out / reserve_in, after = new_out / new_in
    let price_impact_bps = if new_reserve_out == 0 {
        BPS_DENOM
    } else {
        math::relative_diff_bps(
            new_reserve_out,
            reserve_in,
            reserve_out,
            new_reserve_in,
            new_reserve_in,
            reserve_out,
        )?
    };

    let expected_out = math::mul_div(amount_in, reserve_out, reserve_in)?;
    let slippage_bps = if expected_out == 0 || amount_out >= expected_out {
        0
    } else {
        let shortfall = math::mul_div(expected_out - amount_out, BPS_DENOM as Amount, expected_out)?;
        Bps::try_from(shortfall).unwrap_or(Bps::MAX)
    };

    Ok(SwapResult {
        amount_in,
        fee,
        amount_in_after_fee,
        amount_out,
        price_impact_bps,
        slippage_bps,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    /// Lower of the two symbols.
    pub token_a: TokenSymbol,
    pub token_b: TokenSymbol,
    pub reserve_a: Amount,
    pub reserve_b: Amount,
    pub total_shares: Amount,
    pub fee_bps: Bps,
    pub active: bool,
    /// LP shares per provider; sums to `total_shares`.
    pub providers: BTreeMap<Address, Amount>,
}

impl Pool {
    pub fn new(x: TokenSymbol, y: TokenSymbol, fee_bps: Bps) -> Result<Self> {
        if x == y {
            return Err(ChainError::IdenticalTokens(x));
        }
        let id = pool_id(&x, &y);
        let (token_a, token_b) = if x < y { (x, y) } else { (y, x) };
        Ok(Self {
            id,
            token_a,
            token_b,
            reserve_a: 0,
            reserve_b: 0,
            total_shares: 0,
            fee_bps,
            active: true,
            providers: BTreeMap::new(),
        })
    }

    /// Ledger account holding this pool's reserves.
    pub fn address(&self) -> Address {
        Address::pool(&self.id)
    }

    /// Whether `token` is `token_a`; errors if it is not part of the pair.
    pub fn is_token_a(&self, token: &TokenSymbol) -> Result<bool> {
        if *token == self.token_a {
            Ok(true)
        } else if *token == self.token_b {
            Ok(false)
        } else {
            Err(ChainError::PoolNotFound(self.id.clone()))
        }
    }

    /// `(reserve_in, reserve_out)` for a swap paying in `from`.
    pub fn reserves_from(&self, from: &TokenSymbol) -> Result<(Amount, Amount)> {
        Ok(if self.is_token_a(from)? {
            (self.reserve_a, self.reserve_b)
        } else {
            (self.reserve_b, self.reserve_a)
        })
    }

    pub fn quote(&self, from: &TokenSymbol, amount_in: Amount) -> Result<SwapResult> {
        let (reserve_in, reserve_out) = self.reserves_from(from)?;
        quote_swap(reserve_in, reserve_out, amount_in, self.fee_bps)
    }

    pub fn shares_of(&self, provider: &Address) -> Amount {
        self.providers.get(provider).copied().unwrap_or(0)
    }

    /// Shares minted for depositing `(amount_a, amount_b)`: the geometric mean
    /// for the first deposit, otherwise the smaller pro-rata claim.
    pub fn shares_for_deposit(&self, amount_a: Amount, amount_b: Amount) -> Result<Amount> {
        if self.total_shares == 0 {
            return math::sqrt_product(amount_a, amount_b);
        }
        if self.reserve_a == 0 || self.reserve_b == 0 {
            return Err(ChainError::InvariantViolation(format!(
                "pool {} has {} shares but an empty reserve",
                self.id, self.total_shares
            )));
        }
        let by_a = math::mul_div(amount_a, self.total_shares, self.reserve_a)?;
        let by_b = math::mul_div(amount_b, self.total_shares, self.reserve_b)?;
        Ok(by_a.min(by_b))
    }

    /// Reserve amounts `(a, b)` released by burning `shares`.
    pub fn withdrawal_for(&self, shares: Amount) -> Result<(Amount, Amount)> {
        if shares > self.total_shares {
            return Err(ChainError::InsufficientLiquidity(format!(
                "{shares} shares requested, pool {} has {}",
                self.id, self.total_shares
            )));
        }
        Ok((
            math::mul_div(shares, self.reserve_a, self.total_shares)?,
            math::mul_div(shares, self.reserve_b, self.total_shares)?,
        ))
    }

    pub(crate) fn credit_shares(&mut self, provider: &Address, shares: Amount) -> Result<()> {
        let total = math::checked_add(self.total_shares, shares, "pool total shares")?;
        let held = math::checked_add(self.shares_of(provider), shares, "provider shares")?;
        self.total_shares = total;
        self.providers.insert(provider.clone(), held);
        Ok(())
    }

    pub(crate) fn debit_shares(&mut self, provider: &Address, shares: Amount) -> Result<()> {
        let held = self.shares_of(provider);
        let (Some(left), Some(total)) = (held.checked_sub(shares), self.total_shares.checked_sub(shares)) else {
            return Err(ChainError::InvariantViolation(format!(
                "pool {} share underflow for {provider}",
                self.id
            )));
        };
        if left == 0 {
            self.providers.remove(provider);
        } else {
            self.providers.insert(provider.clone(), left);
        }
        self.total_shares = total;
        Ok(())
    }

    /// Apply reserve deltas for a trade paying `amount_in` of `from`.
    pub(crate) fn apply_swap(&mut self, from: &TokenSymbol, amount_in: Amount, amount_out: Amount) -> Result<()> {
        let (reserve_in, reserve_out) = self.reserves_from(from)?;
        let new_in = math::checked_add(reserve_in, amount_in, "swap reserve_in")?;
        let new_out = reserve_out.checked_sub(amount_out).ok_or_else(|| {
            ChainError::InvariantViolation(format!("pool {} reserve underflow on swap", self.id))
        })?;
        if self.is_token_a(from)? {
            self.reserve_a = new_in;
            self.reserve_b = new_out;
        } else {
            self.reserve_b = new_in;
            self.reserve_a = new_out;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cmp::Ordering;

    fn sym(s: &str) -> TokenSymbol {
        TokenSymbol::new(s)
    }

    #[test]
    fn test_pool_id_is_order_independent() {
        assert_eq!(pool_id(&sym("DYS"), &sym("DYO")), "DYO/DYS");
        assert_eq!(pool_id(&sym("DYO"), &sym("DYS")), "DYO/DYS");

        let pool = Pool::new(sym("DYS"), sym("DYO"), 30).unwrap();
        assert_eq!(pool.token_a, sym("DYO"));
        assert_eq!(pool.address().as_str(), "pool:DYO/DYS");
        assert!(Pool::new(sym("DYO"), sym("dyo"), 30).is_err());
    }

    #[test]
    fn test_swap_quote_reference_values() {
        let quote = quote_swap(100_000, 100_000, 1_000, 30).unwrap();
        assert_eq!(quote.fee, 3);
        assert_eq!(quote.amount_in_after_fee, 997);
        assert_eq!(quote.amount_out, 987);
        assert_eq!(quote.slippage_bps, 130);
        assert!(quote.price_impact_bps > 0);
    }

    #[test]
    fn test_slippage_is_price_based() {
        // 20 A into 1_000 A / 1_000_000 B: spot gives 20_000 B, pool pays 19_607
        let quote = quote_swap(1_000, 1_000_000, 20, 30).unwrap();
        assert_eq!(quote.fee, 0);
        assert_eq!(quote.amount_out, 19_607);
        assert_eq!(quote.slippage_bps, 196);
    }

    #[test]
    fn test_quote_rejects_empty_pool_and_zero_input() {
        assert!(matches!(quote_swap(100, 100, 0, 30), Err(ChainError::InvalidAmount)));
        assert!(matches!(
            quote_swap(0, 100, 10, 30),
            Err(ChainError::InsufficientLiquidity(_))
        ));
    }

    #[test]
    fn test_shares_first_and_follow_up_deposit() {
        let mut pool = Pool::new(sym("A"), sym("B"), 30).unwrap();
        assert_eq!(pool.shares_for_deposit(4_000, 9_000).unwrap(), 6_000);

        pool.reserve_a = 4_000;
        pool.reserve_b = 9_000;
        pool.credit_shares(&Address::new("lp"), 6_000).unwrap();

        // off-ratio deposit is credited by the scarcer side
        assert_eq!(pool.shares_for_deposit(400, 1_800).unwrap(), 600);
        assert_eq!(pool.withdrawal_for(3_000).unwrap(), (2_000, 4_500));
        assert!(pool.withdrawal_for(6_001).is_err());
    }

    #[test]
    fn test_debit_shares_removes_empty_provider() {
        let mut pool = Pool::new(sym("A"), sym("B"), 30).unwrap();
        let lp = Address::new("lp");
        pool.credit_shares(&lp, 50).unwrap();
        pool.debit_shares(&lp, 50).unwrap();
        assert!(pool.providers.is_empty());
        assert_eq!(pool.total_shares, 0);
        assert!(pool.debit_shares(&lp, 1).is_err());
    }

    proptest! {
        #[test]
        fn swap_never_decreases_k(
            reserve_in in 1u128..1_000_000_000_000,
            reserve_out in 1u128..1_000_000_000_000,
            amount_in in 1u128..1_000_000_000,
            fee_bps in 0u32..=1_000,
        ) {
            let quote = quote_swap(reserve_in, reserve_out, amount_in, fee_bps).unwrap();
            prop_assert!(quote.amount_out < reserve_out);
            prop_assert!(quote.fee + quote.amount_in_after_fee == amount_in);
            let k_after = cross_cmp_after(reserve_in, reserve_out, &quote);
            prop_assert_ne!(k_after, Ordering::Less);
        }
    }

    fn cross_cmp_after(reserve_in: Amount, reserve_out: Amount, quote: &SwapResult) -> Ordering {
        math::cross_cmp(
            reserve_in + quote.amount_in,
            reserve_out - quote.amount_out,
            reserve_in,
            reserve_out,
        )
    }
}
