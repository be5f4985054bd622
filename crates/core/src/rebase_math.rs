//! Checked U256 arithmetic for Kashi rebase accounting.
//!
//! All conversions truncate like the on-chain implementation. Products are
//! checked so an overflow surfaces as a [`MathError`] instead of wrapping.

use alloy::primitives::U256;
use kashi_chain::{AccrueInfo, Rebase};

use crate::error::MathError;

/// 1e18, the scale of exchange rates and `interestPerSecond`.
pub const E18: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Fractional digits kept when coverage is converted to `f64`.
const COVERAGE_PRECISION: u64 = 10_000;

/// `a * b / d`, truncating.
#[inline]
pub fn mul_div(a: U256, b: U256, d: U256, what: &'static str) -> Result<U256, MathError> {
    if d.is_zero() {
        return Err(MathError::DivisionByZero(what));
    }
    let product = a.checked_mul(b).ok_or(MathError::Overflow(what))?;
    Ok(product / d)
}

/// Convert a base (share) amount to a real amount.
///
/// Returns `base_amount` unchanged when `total.base` is zero.
#[inline]
pub fn to_elastic(total: &Rebase, base_amount: U256) -> Result<U256, MathError> {
    if total.base.is_zero() {
        return Ok(base_amount);
    }
    mul_div(base_amount, total.elastic, total.base, "to_elastic")
}

/// Project `total_borrow` forward to `now_unix` using the pair's interest
/// rate. Local estimate only; `now_unix` should be the snapshot block's
/// timestamp.
pub fn project_accrual(
    total_borrow: &Rebase,
    accrue_info: &AccrueInfo,
    now_unix: u64,
) -> Result<Rebase, MathError> {
    let elapsed = now_unix.saturating_sub(accrue_info.last_accrued);
    if elapsed == 0 {
        return Ok(*total_borrow);
    }

    let rate = U256::from(accrue_info.interest_per_second)
        .checked_mul(U256::from(elapsed))
        .ok_or(MathError::Overflow("project_accrual"))?;
    let extra = mul_div(total_borrow.elastic, rate, E18, "project_accrual")?;
    let elastic = total_borrow
        .elastic
        .checked_add(extra)
        .ok_or(MathError::Overflow("project_accrual"))?;

    Ok(Rebase {
        elastic,
        base: total_borrow.base,
    })
}

/// Debt value in collateral terms over collateral value, in percent.
///
/// `cost_scaled` carries the exchange rate's 1e18 scale. Zero collateral
/// backing any debt is infinite coverage.
pub fn coverage_percent(cost_scaled: U256, collateral: U256) -> Result<f64, MathError> {
    if collateral.is_zero() {
        return Ok(if cost_scaled.is_zero() { 0.0 } else { f64::INFINITY });
    }

    let denominator = collateral
        .checked_mul(E18)
        .ok_or(MathError::Overflow("coverage"))?;
    let scaled = mul_div(
        cost_scaled,
        U256::from(100 * COVERAGE_PRECISION),
        denominator,
        "coverage",
    )?;
    Ok(u256_to_f64(scaled) / COVERAGE_PRECISION as f64)
}

/// Lossy conversion for display and percentage math.
pub fn u256_to_f64(value: U256) -> f64 {
    if value <= U256::from(u128::MAX) {
        return value.to::<u128>() as f64;
    }
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}
