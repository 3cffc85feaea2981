//! Fixed-point helpers.
//!
//! All ledger amounts are integers in the collateral's smallest unit. Products
//! are widened to `U256` and every helper returns `None` instead of wrapping,
//! so callers decide whether overflow means "not fillable" or an error.

use alloy::primitives::U256;
use rust_decimal::Decimal;

/// 100% in basis points.
pub const BPS: u32 = 10_000;

/// Largest value a 112-bit field can hold.
pub const MAX_U112: u128 = (1u128 << 112) - 1;

/// Reward accumulator scale.
pub const ACC_PRECISION: u128 = 1_000_000_000_000_000_000;

/// 2^112, the UQ112x112 unit.
#[must_use]
pub fn q112() -> U256 {
    U256::from(1u8) << 112usize
}

#[must_use]
pub fn acc_precision() -> U256 {
    U256::from(ACC_PRECISION)
}

/// Narrow a `U256` to `u128`, `None` if it does not fit.
#[must_use]
pub fn to_u128(value: U256) -> Option<u128> {
    u128::try_from(value).ok()
}

/// `a * b / denominator`, rounding down.
#[must_use]
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    Some(a.checked_mul(b)? / denominator)
}

/// `a * b / denominator` over `u128` inputs, rounding down.
#[must_use]
pub fn mul_div_u128(a: u128, b: u128, denominator: u128) -> Option<u128> {
    to_u128(mul_div(U256::from(a), U256::from(b), U256::from(denominator))?)
}

/// `a * b / denominator`, rounding up.
#[must_use]
pub fn mul_div_up_u128(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    let product = U256::from(a).checked_mul(U256::from(b))?;
    let d = U256::from(denominator);
    let q = product / d;
    let q = if (product % d).is_zero() { q } else { q.checked_add(U256::from(1u8))? };
    to_u128(q)
}

/// `amount * bps / 10000`, rounding down.
#[must_use]
pub fn apply_bps(amount: u128, bps: u32) -> Option<u128> {
    mul_div_u128(amount, u128::from(bps), u128::from(BPS))
}

/// Integer square root (floor) by Newton iteration.
#[must_use]
pub fn isqrt(n: U256) -> U256 {
    if n.is_zero() {
        return U256::ZERO;
    }
    let one = U256::from(1u8);
    let mut x = n;
    let mut y = (n >> 1usize) + (n & one);
    while y < x {
        x = y;
        y = (x + n / x) >> 1usize;
    }
    x
}

/// Basis points as a probability in `[0, 1]`.
#[must_use]
pub fn bps_to_decimal(bps: u32) -> Decimal {
    Decimal::from(bps) / Decimal::from(BPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mul_div_rounding() {
        assert_eq!(mul_div_u128(10, 3, 4), Some(7));
        assert_eq!(mul_div_up_u128(10, 3, 4), Some(8));
        assert_eq!(mul_div_up_u128(8, 3, 4), Some(6));
        assert_eq!(mul_div_u128(1, 1, 0), None);
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // u128::MAX * 10000 overflows u128 but not U256
        assert_eq!(mul_div_u128(u128::MAX, 10_000, 10_000), Some(u128::MAX));
        assert_eq!(mul_div_u128(u128::MAX, 2, 1), None);
    }

    #[test]
    fn test_mul_div_overflow_is_none() {
        assert_eq!(mul_div(U256::MAX, U256::from(2u8), U256::from(1u8)), None);
    }

    #[test]
    fn test_apply_bps() {
        assert_eq!(apply_bps(1_000, 3_000), Some(300));
        assert_eq!(apply_bps(3, 3_000), Some(0));
    }

    #[test]
    fn test_isqrt() {
        for (n, root) in [(0u64, 0u64), (1, 1), (2, 1), (3, 1), (4, 2), (15, 3), (16, 4), (1_000_000, 1_000)] {
            assert_eq!(isqrt(U256::from(n)), U256::from(root), "isqrt({n})");
        }
        let r = isqrt(U256::MAX);
        assert!(r.checked_mul(r).is_some());
        assert!((r + U256::from(1u8)).checked_mul(r + U256::from(1u8)).is_none());
    }

    #[test]
    fn test_max_u112_and_q112() {
        assert_eq!(U256::from(MAX_U112) + U256::from(1u8), q112());
    }

    #[test]
    fn test_bps_to_decimal() {
        assert_eq!(bps_to_decimal(6_250), dec!(0.625));
    }
}
