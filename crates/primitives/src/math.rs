//! Integer math for token amounts.
//!
//! All state transitions use floor division on unsigned integers. Products that
//! can exceed `u128` are evaluated in arbitrary precision and narrowed back with
//! an explicit overflow error.

use crate::{Amount, Bps, ChainError, Result};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

/// Basis-point denominator (100%).
pub const BPS_DENOM: Bps = 10_000;

/// Seconds in a 365-day year, used for APY accrual.
pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// `floor(a * b / denom)` without intermediate overflow.
pub fn mul_div(a: Amount, b: Amount, denom: Amount) -> Result<Amount> {
    if denom == 0 {
        return Err(ChainError::InvalidParameter("division by zero"));
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / denom);
    }
    let wide = BigUint::from(a) * BigUint::from(b) / BigUint::from(denom);
    wide.to_u128()
        .ok_or(ChainError::ArithmeticOverflow("mul_div"))
}

/// `floor(sqrt(a * b))`, the geometric mean used for first-deposit LP shares.
pub fn sqrt_product(a: Amount, b: Amount) -> Result<Amount> {
    let product = BigUint::from(a) * BigUint::from(b);
    if product.is_zero() {
        return Ok(0);
    }
    product
        .sqrt()
        .to_u128()
        .ok_or(ChainError::ArithmeticOverflow("sqrt_product"))
}

/// `floor(amount * bps / 10_000)`.
pub fn bps_of(amount: Amount, bps: Bps) -> Result<Amount> {
    mul_div(amount, bps as Amount, BPS_DENOM as Amount)
}

/// Checked addition with a named overflow site.
#[inline]
pub fn checked_add(a: Amount, b: Amount, site: &'static str) -> Result<Amount> {
    a.checked_add(b).ok_or(ChainError::ArithmeticOverflow(site))
}

/// Compare `a * b` against `c * d` without overflow.
pub fn cross_cmp(a: Amount, b: Amount, c: Amount, d: Amount) -> std::cmp::Ordering {
    (BigUint::from(a) * BigUint::from(b)).cmp(&(BigUint::from(c) * BigUint::from(d)))
}

/// `floor(|a*b - c*d| * 10_000 / (e*f))`, saturating at `Bps::MAX`.
pub fn relative_diff_bps(a: Amount, b: Amount, c: Amount, d: Amount, e: Amount, f: Amount) -> Result<Bps> {
    let lhs = BigUint::from(a) * BigUint::from(b);
    let rhs = BigUint::from(c) * BigUint::from(d);
    let denom = BigUint::from(e) * BigUint::from(f);
    if denom.is_zero() {
        return Err(ChainError::InvalidParameter("division by zero"));
    }
    let diff = if lhs >= rhs { lhs - rhs } else { rhs - lhs };
    let bps = diff * BigUint::from(BPS_DENOM) / denom;
    Ok(bps.to_u32().unwrap_or(Bps::MAX))
}
