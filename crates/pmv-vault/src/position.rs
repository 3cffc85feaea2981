//! Per-provider vault positions.
//!
//! Pending rewards follow the accumulate-then-subtract-debt pattern:
//! `pending = claimable + shares·acc/1e18 − debt`. Every balance change
//! first folds the pending amount into `claimable` (or pays it out) and then
//! resets the debt against the new balance, so one provider's actions never
//! move another provider's pending amount.

use std::collections::HashMap;

use alloy::primitives::{Address, U256};
use pmv_core::math::{acc_precision, mul_div, to_u128, MAX_U112};
use pmv_core::{Side, VaultError, VaultResult};

/// One provider's claim on a market's vault.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultPosition {
    pub yes_vault_shares: u128,
    pub no_vault_shares: u128,
    /// Seconds since Unix epoch of the most recent deposit on either side.
    pub last_deposit_time: u32,
    pub yes_reward_debt: U256,
    pub no_reward_debt: U256,
    /// Rewards settled but not yet paid.
    pub yes_claimable: u128,
    pub no_claimable: u128,
}

impl VaultPosition {
    #[must_use]
    pub fn shares(&self, side: Side) -> u128 {
        match side {
            Side::Yes => self.yes_vault_shares,
            Side::No => self.no_vault_shares,
        }
    }

    #[must_use]
    pub fn reward_debt(&self, side: Side) -> U256 {
        match side {
            Side::Yes => self.yes_reward_debt,
            Side::No => self.no_reward_debt,
        }
    }

    #[must_use]
    pub fn claimable(&self, side: Side) -> u128 {
        match side {
            Side::Yes => self.yes_claimable,
            Side::No => self.no_claimable,
        }
    }

    /// Pending rewards on `side` against accumulator value `acc`.
    pub fn pending(&self, side: Side, acc: U256) -> VaultResult<u128> {
        let earned = accrued(self.shares(side), acc)?;
        let unsettled = earned
            .checked_sub(self.reward_debt(side))
            .ok_or(VaultError::Overflow("reward debt above earned"))?;
        let unsettled = to_u128(unsettled).ok_or(VaultError::Overflow("pending rewards"))?;
        unsettled
            .checked_add(self.claimable(side))
            .ok_or(VaultError::Overflow("pending rewards"))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.yes_vault_shares == 0
            && self.no_vault_shares == 0
            && self.yes_reward_debt.is_zero()
            && self.no_reward_debt.is_zero()
            && self.yes_claimable == 0
            && self.no_claimable == 0
    }

    fn set(&mut self, side: Side, shares: u128, debt: U256, claimable: u128) {
        match side {
            Side::Yes => {
                self.yes_vault_shares = shares;
                self.yes_reward_debt = debt;
                self.yes_claimable = claimable;
            }
            Side::No => {
                self.no_vault_shares = shares;
                self.no_reward_debt = debt;
                self.no_claimable = claimable;
            }
        }
    }
}

fn accrued(shares: u128, acc: U256) -> VaultResult<U256> {
    mul_div(U256::from(shares), acc, acc_precision()).ok_or(VaultError::Overflow("accrued rewards"))
}

/// All positions of one market plus the per-side share totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultPositionLedger {
    positions: HashMap<Address, VaultPosition>,
    total_yes: u128,
    total_no: u128,
}

impl VaultPositionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn total_shares(&self, side: Side) -> u128 {
        match side {
            Side::Yes => self.total_yes,
            Side::No => self.total_no,
        }
    }

    #[must_use]
    pub fn position(&self, provider: &Address) -> Option<&VaultPosition> {
        self.positions.get(provider)
    }

    pub fn providers(&self) -> impl Iterator<Item = &Address> {
        self.positions.keys()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn pending(&self, provider: &Address, side: Side, acc: U256) -> VaultResult<u128> {
        self.positions
            .get(provider)
            .map_or(Ok(0), |p| p.pending(side, acc))
    }

    /// Totals equal the sum of every provider's shares.
    #[must_use]
    pub fn is_conserved(&self) -> bool {
        let (yes, no) = self.positions.values().fold((0u128, 0u128), |(y, n), p| {
            (y.saturating_add(p.yes_vault_shares), n.saturating_add(p.no_vault_shares))
        });
        yes == self.total_yes && no == self.total_no
    }

    fn total_mut(&mut self, side: Side) -> &mut u128 {
        match side {
            Side::Yes => &mut self.total_yes,
            Side::No => &mut self.total_no,
        }
    }

    /// Credit `shares` vault shares, settling pending rewards into claimable.
    pub fn deposit(
        &mut self,
        provider: Address,
        side: Side,
        shares: u128,
        acc: U256,
        now: u32,
    ) -> VaultResult<()> {
        let total = self
            .total_shares(side)
            .checked_add(shares)
            .filter(|t| *t <= MAX_U112)
            .ok_or(VaultError::Overflow("total vault shares"))?;

        let position = self.positions.entry(provider).or_default();
        let pending = position.pending(side, acc)?;
        let balance = position.shares(side) + shares;
        let debt = accrued(balance, acc)?;
        position.set(side, balance, debt, pending);
        position.last_deposit_time = now;

        *self.total_mut(side) = total;
        Ok(())
    }

    /// Burn `shares` and pay out everything pending on that side.
    ///
    /// Returns the rewards paid.
    pub fn withdraw(
        &mut self,
        provider: &Address,
        side: Side,
        shares: u128,
        acc: U256,
    ) -> VaultResult<u128> {
        let position = self
            .positions
            .get_mut(provider)
            .ok_or_else(|| VaultError::invalid("no vault position"))?;
        let balance = position
            .shares(side)
            .checked_sub(shares)
            .ok_or_else(|| VaultError::invalid("withdraw exceeds vault shares"))?;

        let paid = position.pending(side, acc)?;
        let debt = accrued(balance, acc)?;
        position.set(side, balance, debt, 0);

        let total = self.total_mut(side);
        *total = total
            .checked_sub(shares)
            .ok_or(VaultError::Overflow("total vault shares"))?;
        self.prune(provider);
        Ok(paid)
    }

    /// Zero every provider's shares on `side`, keeping what they have earned.
    ///
    /// Used once a side's inventory is gone: the old shares no longer claim
    /// anything but fees, so the next deposit starts the side over at 1:1.
    /// Returns the number of shares retired.
    pub fn retire_side(&mut self, side: Side, acc: U256) -> VaultResult<u128> {
        for position in self.positions.values_mut() {
            if position.shares(side) == 0 {
                continue;
            }
            let pending = position.pending(side, acc)?;
            position.set(side, 0, U256::ZERO, pending);
        }
        self.positions.retain(|_, p| !p.is_empty());
        Ok(std::mem::take(self.total_mut(side)))
    }

    /// Pay out pending rewards without touching the balance.
    pub fn harvest(&mut self, provider: &Address, side: Side, acc: U256) -> VaultResult<u128> {
        let Some(position) = self.positions.get_mut(provider) else {
            return Ok(0);
        };
        let paid = position.pending(side, acc)?;
        let balance = position.shares(side);
        let debt = accrued(balance, acc)?;
        position.set(side, balance, debt, 0);
        self.prune(provider);
        Ok(paid)
    }

    /// Drop the position once nothing is owed to or held by it.
    fn prune(&mut self, provider: &Address) {
        if self.positions.get(provider).is_some_and(VaultPosition::is_empty) {
            self.positions.remove(provider);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc(per_share_times_1e18: u128) -> U256 {
        U256::from(per_share_times_1e18)
    }

    fn alice() -> Address {
        Address::repeat_byte(0xa1)
    }

    fn bob() -> Address {
        Address::repeat_byte(0xb0)
    }

    const E18: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn test_deposit_sets_debt_and_totals() {
        let mut ledger = VaultPositionLedger::new();
        ledger.deposit(alice(), Side::Yes, 100, acc(2 * E18), 10).unwrap();

        let p = ledger.position(&alice()).unwrap();
        assert_eq!(p.yes_vault_shares, 100);
        assert_eq!(p.yes_reward_debt, U256::from(200u32));
        assert_eq!(p.last_deposit_time, 10);
        assert_eq!(ledger.total_shares(Side::Yes), 100);
        assert_eq!(ledger.pending(&alice(), Side::Yes, acc(2 * E18)).unwrap(), 0);
    }

    #[test]
    fn test_second_deposit_preserves_pending() {
        let mut ledger = VaultPositionLedger::new();
        ledger.deposit(alice(), Side::Yes, 100, acc(0), 10).unwrap();

        // 0.25 collateral per share accrues
        let a = acc(E18 / 4);
        let before = ledger.pending(&alice(), Side::Yes, a).unwrap();
        assert_eq!(before, 25);

        ledger.deposit(alice(), Side::Yes, 50, a, 20).unwrap();
        assert_eq!(ledger.pending(&alice(), Side::Yes, a).unwrap(), before);
        assert_eq!(ledger.position(&alice()).unwrap().yes_claimable, 25);
    }

    #[test]
    fn test_other_provider_does_not_dilute() {
        let mut ledger = VaultPositionLedger::new();
        ledger.deposit(alice(), Side::No, 100, acc(0), 0).unwrap();
        let a = acc(E18);
        let alice_pending = ledger.pending(&alice(), Side::No, a).unwrap();

        ledger.deposit(bob(), Side::No, 1_000, a, 5).unwrap();
        assert_eq!(ledger.pending(&alice(), Side::No, a).unwrap(), alice_pending);
        assert_eq!(ledger.pending(&bob(), Side::No, a).unwrap(), 0);

        ledger.withdraw(&bob(), Side::No, 1_000, a).unwrap();
        assert_eq!(ledger.pending(&alice(), Side::No, a).unwrap(), alice_pending);
        assert!(ledger.is_conserved());
    }

    #[test]
    fn test_withdraw_pays_pending_and_prunes() {
        let mut ledger = VaultPositionLedger::new();
        ledger.deposit(alice(), Side::Yes, 100, acc(0), 0).unwrap();

        let paid = ledger.withdraw(&alice(), Side::Yes, 100, acc(E18 / 2)).unwrap();
        assert_eq!(paid, 50);
        assert!(ledger.position(&alice()).is_none());
        assert_eq!(ledger.total_shares(Side::Yes), 0);
        assert!(ledger.is_conserved());
    }

    #[test]
    fn test_withdraw_more_than_held_fails() {
        let mut ledger = VaultPositionLedger::new();
        ledger.deposit(alice(), Side::Yes, 10, acc(0), 0).unwrap();
        let err = ledger.withdraw(&alice(), Side::Yes, 11, acc(0)).unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMETER");
        assert_eq!(ledger.total_shares(Side::Yes), 10);
    }

    #[test]
    fn test_harvest_keeps_balance() {
        let mut ledger = VaultPositionLedger::new();
        ledger.deposit(alice(), Side::Yes, 40, acc(0), 0).unwrap();
        assert_eq!(ledger.harvest(&alice(), Side::Yes, acc(E18)).unwrap(), 40);
        assert_eq!(ledger.harvest(&alice(), Side::Yes, acc(E18)).unwrap(), 0);
        assert_eq!(ledger.position(&alice()).unwrap().yes_vault_shares, 40);
        assert_eq!(ledger.harvest(&bob(), Side::Yes, acc(E18)).unwrap(), 0);
    }

    #[test]
    fn test_retire_side_keeps_pending_fees() {
        let mut ledger = VaultPositionLedger::new();
        ledger.deposit(alice(), Side::No, 100, acc(0), 0).unwrap();
        ledger.deposit(bob(), Side::No, 300, acc(0), 0).unwrap();
        ledger.deposit(bob(), Side::Yes, 50, acc(0), 0).unwrap();

        let a = acc(E18 / 10);
        assert_eq!(ledger.retire_side(Side::No, a).unwrap(), 400);
        assert_eq!(ledger.total_shares(Side::No), 0);
        assert_eq!(ledger.total_shares(Side::Yes), 50);
        assert!(ledger.is_conserved());

        // Fees earned before the side emptied stay claimable
        assert_eq!(ledger.pending(&alice(), Side::No, a).unwrap(), 10);
        assert_eq!(ledger.pending(&bob(), Side::No, a).unwrap(), 30);
        // Later accrual no longer reaches retired shares
        assert_eq!(ledger.pending(&alice(), Side::No, acc(E18)).unwrap(), 10);
        assert_eq!(ledger.position(&bob()).unwrap().yes_vault_shares, 50);

        assert_eq!(ledger.harvest(&alice(), Side::No, a).unwrap(), 10);
        assert!(ledger.position(&alice()).is_none());
    }

    #[test]
    fn test_retire_side_prunes_positions_with_nothing_owed() {
        let mut ledger = VaultPositionLedger::new();
        ledger.deposit(alice(), Side::Yes, 10, acc(0), 0).unwrap();
        assert_eq!(ledger.retire_side(Side::Yes, acc(0)).unwrap(), 10);
        assert!(ledger.is_empty());
        assert_eq!(ledger.retire_side(Side::Yes, acc(0)).unwrap(), 0);
    }

    #[test]
    fn test_partial_withdrawals_sum_to_single_withdrawal() {
        let mut single = VaultPositionLedger::new();
        let mut partial = VaultPositionLedger::new();
        single.deposit(alice(), Side::Yes, 1_000, acc(0), 0).unwrap();
        partial.deposit(alice(), Side::Yes, 1_000, acc(0), 0).unwrap();

        let a = acc(E18 / 3);
        let partial_paid: u128 = (0..4)
            .map(|_| partial.withdraw(&alice(), Side::Yes, 250, a).unwrap())
            .sum();
        let single_paid = single.withdraw(&alice(), Side::Yes, 1_000, a).unwrap();

        assert_eq!(single_paid, 333);
        assert!(single_paid.abs_diff(partial_paid) <= 4);
        assert!(partial.position(&alice()).is_none());
    }
}
