//! Rebalance sizing and notional-weighted splits.

use alloy::primitives::U256;
use pmv_core::math::{apply_bps, mul_div, to_u128, BPS};
use pmv_core::{Side, VaultError, VaultResult};

/// Amount split between the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SideSplit {
    pub yes: u128,
    pub no: u128,
}

impl SideSplit {
    #[must_use]
    pub fn of(&self, side: Side) -> u128 {
        match side {
            Side::Yes => self.yes,
            Side::No => self.no,
        }
    }
}

/// Split `amount` proportionally to the two weights. Equal weights
/// (including both zero) split evenly, with the odd unit going to NO.
pub fn split_by_weight(amount: u128, weight_yes: U256, weight_no: U256) -> VaultResult<SideSplit> {
    let total = weight_yes
        .checked_add(weight_no)
        .ok_or(VaultError::Overflow("split weights"))?;
    let yes = if total.is_zero() {
        amount / 2
    } else {
        let share = mul_div(U256::from(amount), weight_yes, total)
            .ok_or(VaultError::Overflow("weighted split"))?;
        to_u128(share).ok_or(VaultError::Overflow("weighted split"))?
    };
    Ok(SideSplit {
        yes,
        no: amount - yes,
    })
}

/// TWAP-valued notional of each side's LP shares.
#[must_use]
pub fn share_notional_weights(total_yes_shares: u128, total_no_shares: u128, p_yes_bps: u32) -> (U256, U256) {
    (
        U256::from(total_yes_shares) * U256::from(Side::Yes.price_bps(p_yes_bps)),
        U256::from(total_no_shares) * U256::from(Side::No.price_bps(p_yes_bps)),
    )
}

/// Pairs to merge and how the released collateral is divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalancePlan {
    /// YES+NO pairs merged into collateral.
    pub merge: u128,
    /// Paid to the caller.
    pub bounty: u128,
    /// Credited to LPs (or the budget).
    pub distribute: u128,
}

/// Size a rebalance of the given inventory, `None` when nothing pairs up.
#[must_use]
pub fn plan_rebalance(yes_inventory: u128, no_inventory: u128, bounty_bps: u32) -> Option<RebalancePlan> {
    let merge = yes_inventory.min(no_inventory);
    if merge == 0 {
        return None;
    }
    let bounty = apply_bps(merge, bounty_bps.min(BPS))?;
    Some(RebalancePlan {
        merge,
        bounty,
        distribute: merge - bounty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_by_weight() {
        let split = split_by_weight(100, U256::from(3u8), U256::from(1u8)).unwrap();
        assert_eq!(split, SideSplit { yes: 75, no: 25 });
    }

    #[test]
    fn test_split_zero_weights_is_even() {
        let split = split_by_weight(11, U256::ZERO, U256::ZERO).unwrap();
        assert_eq!(split, SideSplit { yes: 5, no: 6 });
    }

    #[test]
    fn test_split_one_sided_weight() {
        let split = split_by_weight(11, U256::ZERO, U256::from(9u8)).unwrap();
        assert_eq!(split, SideSplit { yes: 0, no: 11 });
    }

    #[test]
    fn test_share_notional_weights() {
        let (yes, no) = share_notional_weights(100, 100, 7_000);
        assert_eq!(yes, U256::from(700_000u32));
        assert_eq!(no, U256::from(300_000u32));
    }

    #[test]
    fn test_plan_rebalance() {
        let plan = plan_rebalance(70, 120, 2_000).unwrap();
        assert_eq!(plan.merge, 70);
        assert_eq!(plan.bounty, 14);
        assert_eq!(plan.distribute, 56);
    }

    #[test]
    fn test_plan_rebalance_nothing_to_merge() {
        assert!(plan_rebalance(0, 120, 2_000).is_none());
        assert!(plan_rebalance(50, 0, 2_000).is_none());
    }
}
