//! Reward-per-share accumulators and the rebalance budget.

use alloy::primitives::U256;
use pmv_core::math::{acc_precision, mul_div};
use pmv_core::{Side, VaultError, VaultResult};

/// Where a fee credit ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeRouting {
    /// Credited to the side's accumulator.
    Accrued,
    /// No LP on that side (or too small to register); sent to the budget.
    ToBudget,
}

/// Collateral earned per vault share, scaled by 1e18, one total per side.
///
/// Both totals only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardAccumulator {
    acc_yes_per_share: U256,
    acc_no_per_share: U256,
}

impl RewardAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn per_share(&self, side: Side) -> U256 {
        match side {
            Side::Yes => self.acc_yes_per_share,
            Side::No => self.acc_no_per_share,
        }
    }

    /// Spread `amount` over `total_shares` on `side`.
    ///
    /// Returns `ToBudget` without touching the accumulator when there is no
    /// one to credit or the increment rounds to zero.
    pub fn accrue(&mut self, side: Side, amount: u128, total_shares: u128) -> VaultResult<FeeRouting> {
        if amount == 0 {
            return Ok(FeeRouting::Accrued);
        }
        if total_shares == 0 {
            return Ok(FeeRouting::ToBudget);
        }
        let increment = mul_div(U256::from(amount), acc_precision(), U256::from(total_shares))
            .ok_or(VaultError::Overflow("accumulator increment"))?;
        if increment.is_zero() {
            return Ok(FeeRouting::ToBudget);
        }
        let slot = match side {
            Side::Yes => &mut self.acc_yes_per_share,
            Side::No => &mut self.acc_no_per_share,
        };
        *slot = slot
            .checked_add(increment)
            .ok_or(VaultError::Overflow("accumulator"))?;
        Ok(FeeRouting::Accrued)
    }
}

/// Collateral held back for rebalancing and keeper incentives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebalanceBudget(u128);

impl RebalanceBudget {
    #[must_use]
    pub fn amount(&self) -> u128 {
        self.0
    }

    pub fn add(&mut self, amount: u128) -> VaultResult<()> {
        self.0 = self
            .0
            .checked_add(amount)
            .ok_or(VaultError::Overflow("rebalance budget"))?;
        Ok(())
    }

    /// Drain the whole budget.
    pub fn take(&mut self) -> u128 {
        std::mem::take(&mut self.0)
    }
}
