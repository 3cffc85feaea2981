//! Constant-product pricing math.
//!
//! Pool convention: YES is token0, NO is token1, and
//! `P(YES) = NO / (YES + NO)`. Every function here degrades to `None` or
//! zero on overflow; none of them panic or wrap.

use alloy::primitives::U256;
use pmv_core::math::{isqrt, mul_div_u128, to_u128, BPS};
use pmv_core::Side;
use serde::{Deserialize, Serialize};

/// Binary search iterations used when sizing a fill under the impact cap.
pub const IMPACT_SEARCH_ITERATIONS: u32 = 16;

/// Pool reserves for one market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolReserves {
    pub yes: u128,
    pub no: u128,
}

impl PoolReserves {
    #[must_use]
    pub fn new(yes: u128, no: u128) -> Self {
        Self { yes, no }
    }

    #[must_use]
    pub fn of(&self, side: Side) -> u128 {
        match side {
            Side::Yes => self.yes,
            Side::No => self.no,
        }
    }

    /// Spot P(YES) in bps, `None` for an empty or one-sided pool.
    #[must_use]
    pub fn spot_yes_bps(&self) -> Option<u32> {
        if self.yes == 0 || self.no == 0 {
            return None;
        }
        let total = self.yes.checked_add(self.no)?;
        let bps = mul_div_u128(self.no, u128::from(BPS), total)?;
        u32::try_from(bps).ok()
    }

    fn with_side(self, side: Side, amount: u128) -> Self {
        match side {
            Side::Yes => Self { yes: amount, ..self },
            Side::No => Self { no: amount, ..self },
        }
    }
}

/// Result of buying `side` with collateral on the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuyQuote {
    /// Collateral split into pairs.
    pub collateral_in: u128,
    /// Opposite-side shares received from the swap.
    pub swap_out: u128,
    /// Total shares delivered: split shares plus swap output.
    pub shares_out: u128,
    /// Absolute P(YES) move in bps.
    pub impact_bps: u32,
}

/// Result of selling `side` shares on the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellQuote {
    /// Shares sold into the pool.
    pub swap_in: u128,
    /// Opposite-side shares received.
    pub swap_out: u128,
    /// Pairs merged back into collateral.
    pub collateral_out: u128,
    /// Absolute P(YES) move in bps.
    pub impact_bps: u32,
}

impl SellQuote {
    /// Shares of the sold side left over after merging.
    #[must_use]
    pub fn unsold_shares(&self, shares_in: u128) -> u128 {
        shares_in
            .saturating_sub(self.swap_in)
            .saturating_sub(self.collateral_out)
    }

    /// Opposite-side shares left over after merging.
    #[must_use]
    pub fn excess_opposite(&self) -> u128 {
        self.swap_out.saturating_sub(self.collateral_out)
    }
}

/// Constant-product output for `amount_in` with a fee in bps.
///
/// `out = in·(1e4 − fee)·R_out / (R_in·1e4 + in·(1e4 − fee))`
#[must_use]
pub fn amount_out(amount_in: u128, reserve_in: u128, reserve_out: u128, fee_bps: u32) -> Option<u128> {
    if fee_bps >= BPS {
        return None;
    }
    if amount_in == 0 {
        return Some(0);
    }
    if reserve_in == 0 || reserve_out == 0 {
        return None;
    }
    let in_with_fee = U256::from(amount_in).checked_mul(U256::from(BPS - fee_bps))?;
    let numerator = in_with_fee.checked_mul(U256::from(reserve_out))?;
    let denominator = U256::from(reserve_in)
        .checked_mul(U256::from(BPS))?
        .checked_add(in_with_fee)?;
    to_u128(numerator / denominator)
}

fn impact_between(before: PoolReserves, after: PoolReserves) -> Option<u32> {
    let p_before = before.spot_yes_bps()?;
    let p_after = after.spot_yes_bps()?;
    Some(p_before.abs_diff(p_after))
}

/// Quote buying `side` with `collateral`: split into pairs, swap the
/// opposite side for `side`.
///
/// `None` when the swap would drain the pool or overflows.
#[must_use]
pub fn quote_buy(reserves: PoolReserves, side: Side, collateral: u128, fee_bps: u32) -> Option<BuyQuote> {
    let reserve_out = reserves.of(side);
    let reserve_in = reserves.of(side.opposite());
    let swap_out = amount_out(collateral, reserve_in, reserve_out, fee_bps)?;
    if swap_out >= reserve_out {
        return None;
    }
    let after = reserves
        .with_side(side, reserve_out - swap_out)
        .with_side(side.opposite(), reserve_in.checked_add(collateral)?);
    Some(BuyQuote {
        collateral_in: collateral,
        swap_out,
        shares_out: collateral.checked_add(swap_out)?,
        impact_bps: impact_between(reserves, after)?,
    })
}

/// How many of `shares` to swap so the swap output pairs up with the
/// remainder for a merge.
///
/// Solves `f·x² + (R_in·1e4 + f·R_out − s·f)·x − s·R_in·1e4 = 0` with
/// `f = 1e4 − fee`. Never returns more than `shares`; overflowing or
/// degenerate inputs return 0.
#[must_use]
pub fn swap_amount_for_merge(shares: u128, reserve_in: u128, reserve_out: u128, fee_bps: u32) -> u128 {
    solve_merge_swap(shares, reserve_in, reserve_out, fee_bps)
        .map(|x| x.min(shares))
        .unwrap_or(0)
}

fn solve_merge_swap(shares: u128, reserve_in: u128, reserve_out: u128, fee_bps: u32) -> Option<u128> {
    if shares == 0 || reserve_in == 0 || reserve_out == 0 || fee_bps >= BPS {
        return None;
    }
    let f = U256::from(BPS - fee_bps);
    let s = U256::from(shares);
    let r_in = U256::from(reserve_in).checked_mul(U256::from(BPS))?;
    let f_r_out = f.checked_mul(U256::from(reserve_out))?;
    let f_s = f.checked_mul(s)?;

    // b may be negative when selling more than the pool holds
    let positive = r_in.checked_add(f_r_out)?;
    let (b_abs, b_negative) = if positive >= f_s {
        (positive - f_s, false)
    } else {
        (f_s - positive, true)
    };

    let four_ac = U256::from(4u8)
        .checked_mul(f)?
        .checked_mul(s)?
        .checked_mul(r_in)?;
    let discriminant = b_abs.checked_mul(b_abs)?.checked_add(four_ac)?;
    let root = isqrt(discriminant);

    let numerator = if b_negative {
        root.checked_add(b_abs)?
    } else {
        root.checked_sub(b_abs)?
    };
    let two_a = f.checked_mul(U256::from(2u8))?;
    to_u128(numerator / two_a)
}

/// Quote selling `shares` of `side`: swap part of them for the opposite
/// side and merge pairs into collateral.
#[must_use]
pub fn quote_sell(reserves: PoolReserves, side: Side, shares: u128, fee_bps: u32) -> Option<SellQuote> {
    let reserve_in = reserves.of(side);
    let reserve_out = reserves.of(side.opposite());
    let swap_in = swap_amount_for_merge(shares, reserve_in, reserve_out, fee_bps);
    if swap_in == 0 {
        return None;
    }
    let swap_out = amount_out(swap_in, reserve_in, reserve_out, fee_bps)?;
    if swap_out >= reserve_out {
        return None;
    }
    let collateral_out = swap_out.min(shares - swap_in);
    let after = reserves
        .with_side(side, reserve_in.checked_add(swap_in)?)
        .with_side(side.opposite(), reserve_out - swap_out);
    Some(SellQuote {
        swap_in,
        swap_out,
        collateral_out,
        impact_bps: impact_between(reserves, after)?,
    })
}

/// Largest amount in `[0, max_amount]` whose impact stays within
/// `max_impact_bps`, found by bounded binary search.
///
/// `impact` returns `None` for amounts that cannot be filled at all.
pub fn max_amount_under_impact<F>(max_amount: u128, max_impact_bps: u32, impact: F) -> u128
where
    F: Fn(u128) -> Option<u32>,
{
    let within = |amount: u128| impact(amount).is_some_and(|bps| bps <= max_impact_bps);

    if max_amount == 0 || max_impact_bps == 0 {
        return 0;
    }
    if within(max_amount) {
        return max_amount;
    }
    if max_amount <= 1 {
        return 0;
    }

    let mut lo = 1u128;
    let mut hi = max_amount;
    for _ in 0..IMPACT_SEARCH_ITERATIONS {
        let mid = lo + (hi - lo) / 2;
        if mid == lo {
            break;
        }
        if within(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    if within(lo) {
        lo
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spot_price() {
        assert_eq!(PoolReserves::new(1_000, 1_000).spot_yes_bps(), Some(5_000));
        assert_eq!(PoolReserves::new(100, 300).spot_yes_bps(), Some(7_500));
        assert_eq!(PoolReserves::new(0, 300).spot_yes_bps(), None);
    }

    #[test]
    fn test_amount_out_with_fee() {
        // 84 * 9970 * 1000 / (1000 * 10000 + 84 * 9970) = 77.27
        assert_eq!(amount_out(84, 1_000, 1_000, 30), Some(77));
        assert_eq!(amount_out(0, 1_000, 1_000, 30), Some(0));
        assert_eq!(amount_out(10, 0, 1_000, 30), None);
        assert_eq!(amount_out(10, 1_000, 1_000, 10_000), None);
    }

    #[test]
    fn test_amount_out_overflow_is_none() {
        assert_eq!(amount_out(u128::MAX, u128::MAX, u128::MAX, 0), None);
    }

    #[test]
    fn test_quote_buy() {
        let quote = quote_buy(PoolReserves::new(1_000, 1_000), Side::Yes, 84, 30).unwrap();
        assert_eq!(quote.swap_out, 77);
        assert_eq!(quote.shares_out, 161);
        // after: YES 923, NO 1084 -> 5401 bps
        assert_eq!(quote.impact_bps, 401);
    }

    #[test]
    fn test_quote_buy_no_moves_price_down() {
        let reserves = PoolReserves::new(1_000, 1_000);
        let quote = quote_buy(reserves, Side::No, 84, 30).unwrap();
        assert_eq!(quote.shares_out, 161);
        // after: YES 1084, NO 923 -> 4598 bps
        assert_eq!(quote.impact_bps, 402);
    }

    #[test]
    fn test_swap_amount_for_merge_balanced_pool() {
        // x^2 + 1900x - 100000 = 0 -> x = 51.2
        assert_eq!(swap_amount_for_merge(100, 1_000, 1_000, 0), 51);
    }

    #[test]
    fn test_swap_amount_for_merge_pairs_up() {
        let shares = 5_000_000u128;
        let x = swap_amount_for_merge(shares, 40_000_000, 60_000_000, 30);
        let out = amount_out(x, 40_000_000, 60_000_000, 30).unwrap();
        let remainder = shares - x;
        assert!(remainder.abs_diff(out) <= 4, "x={x} out={out} remainder={remainder}");
    }

    #[test]
    fn test_swap_amount_for_merge_never_exceeds_input() {
        let cases = [
            (1u128, 1_000u128, 1_000u128, 30u32),
            (1, 1, 1, 0),
            (u128::MAX, 1_000, 1_000, 30),
            (u128::MAX, u128::MAX, u128::MAX, 30),
            (1, u128::MAX, 1, 9_999),
            (10_000_000, 1, 1, 30),
            (1 << 100, 1 << 100, 1 << 100, 75),
        ];
        for (shares, r_in, r_out, fee) in cases {
            let x = swap_amount_for_merge(shares, r_in, r_out, fee);
            assert!(x <= shares, "shares={shares} r_in={r_in} r_out={r_out} -> {x}");
        }
    }

    #[test]
    fn test_swap_amount_for_merge_degenerate_is_zero() {
        assert_eq!(swap_amount_for_merge(0, 1_000, 1_000, 30), 0);
        assert_eq!(swap_amount_for_merge(100, 0, 1_000, 30), 0);
        assert_eq!(swap_amount_for_merge(100, 1_000, 1_000, 10_000), 0);
        assert_eq!(swap_amount_for_merge(u128::MAX, u128::MAX, u128::MAX, 30), 0);
    }

    #[test]
    fn test_selling_more_than_pool_holds() {
        // negative linear term
        let x = swap_amount_for_merge(10_000, 100, 100, 0);
        assert!(x > 0 && x <= 10_000);
    }

    #[test]
    fn test_quote_sell() {
        let quote = quote_sell(PoolReserves::new(1_000, 1_000), Side::Yes, 100, 0).unwrap();
        assert_eq!(quote.swap_in, 51);
        assert_eq!(quote.swap_out, 48);
        assert_eq!(quote.collateral_out, 48);
        assert_eq!(quote.unsold_shares(100), 1);
        assert_eq!(quote.excess_opposite(), 0);
        // after: YES 1051, NO 952 -> 4752 bps
        assert_eq!(quote.impact_bps, 248);
    }

    #[test]
    fn test_max_amount_under_impact_full_fill() {
        let reserves = PoolReserves::new(1_000, 1_000);
        let max = max_amount_under_impact(84, 1_200, |c| {
            quote_buy(reserves, Side::Yes, c, 30).map(|q| q.impact_bps)
        });
        assert_eq!(max, 84);
    }

    #[test]
    fn test_max_amount_under_impact_partial_fill() {
        let reserves = PoolReserves::new(1_000, 1_000);
        let impact = |c| quote_buy(reserves, Side::Yes, c, 30).map(|q| q.impact_bps);
        let max = max_amount_under_impact(5_000, 1_200, impact);
        assert!(max > 0 && max < 5_000);
        assert!(impact(max).unwrap() <= 1_200);
        assert!(impact(5_000).map_or(true, |bps| bps > 1_200));
    }

    #[test]
    fn test_max_amount_under_impact_zero_cap() {
        assert_eq!(max_amount_under_impact(100, 0, |_| Some(0)), 0);
        assert_eq!(max_amount_under_impact(100, 10, |_| None), 0);
    }
}
