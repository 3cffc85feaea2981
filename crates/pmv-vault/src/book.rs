//! Everything the router keeps for one market.

use alloy::primitives::Address;
use pmv_core::math::mul_div_u128;
use pmv_core::{MarketId, Side, TimingKind, VaultError, VaultResult};
use pmv_oracle::{TwapObservation, TwapOracle};
use tracing::debug;

use crate::accumulator::{FeeRouting, RebalanceBudget, RewardAccumulator};
use crate::packed::{PackedVaultState, Sign, VaultInventory};
use crate::position::VaultPositionLedger;
use crate::rebalance::SideSplit;

/// Result of a vault withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Withdrawal {
    /// Outcome shares returned to the provider.
    pub inventory: u128,
    /// Collateral rewards paid.
    pub fees: u128,
}

/// Where a distributed amount went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Distribution {
    pub to_yes: u128,
    pub to_no: u128,
    pub to_budget: u128,
}

impl Distribution {
    #[must_use]
    pub fn to_lps(&self) -> u128 {
        self.to_yes + self.to_no
    }
}

/// Vault record, oracle, accumulators, budget and positions for one market.
#[derive(Debug, Clone)]
pub struct MarketBook {
    market: MarketId,
    close_time: u64,
    vault: PackedVaultState,
    twap: TwapOracle,
    rewards: RewardAccumulator,
    budget: RebalanceBudget,
    positions: VaultPositionLedger,
}

impl MarketBook {
    /// Fresh book with an empty vault and a single TWAP observation.
    #[must_use]
    pub fn new(market: MarketId, close_time: u64, first_observation: TwapObservation) -> Self {
        let mut vault = PackedVaultState::default();
        vault.touch_activity(first_observation.timestamp);
        Self {
            market,
            close_time,
            vault,
            twap: TwapOracle::new(first_observation),
            rewards: RewardAccumulator::new(),
            budget: RebalanceBudget::default(),
            positions: VaultPositionLedger::new(),
        }
    }

    #[must_use]
    pub fn market(&self) -> MarketId {
        self.market
    }

    #[must_use]
    pub fn close_time(&self) -> u64 {
        self.close_time
    }

    #[must_use]
    pub fn vault(&self) -> &PackedVaultState {
        &self.vault
    }

    #[must_use]
    pub fn inventory(&self) -> VaultInventory {
        self.vault.inventory()
    }

    #[must_use]
    pub fn twap(&self) -> &TwapOracle {
        &self.twap
    }

    pub fn twap_mut(&mut self) -> &mut TwapOracle {
        &mut self.twap
    }

    #[must_use]
    pub fn rewards(&self) -> &RewardAccumulator {
        &self.rewards
    }

    #[must_use]
    pub fn budget(&self) -> u128 {
        self.budget.amount()
    }

    #[must_use]
    pub fn positions(&self) -> &VaultPositionLedger {
        &self.positions
    }

    #[must_use]
    pub fn total_shares(&self, side: Side) -> u128 {
        self.positions.total_shares(side)
    }

    #[must_use]
    pub fn is_closed(&self, now: u64) -> bool {
        now >= self.close_time
    }

    /// True once `now` is within `window_secs` of close (or past it).
    #[must_use]
    pub fn in_close_window(&self, now: u64, window_secs: u64) -> bool {
        now.saturating_add(window_secs) >= self.close_time
    }

    pub fn pending(&self, provider: &Address, side: Side) -> VaultResult<u128> {
        self.positions
            .pending(provider, side, self.rewards.per_share(side))
    }

    // ------------------------------------------------------------------
    // Fees and budget
    // ------------------------------------------------------------------

    /// Credit fee income to `side`'s LPs, or to the budget if it has none.
    pub fn add_fees(&mut self, side: Side, amount: u128) -> VaultResult<FeeRouting> {
        let routing = self
            .rewards
            .accrue(side, amount, self.positions.total_shares(side))?;
        if routing == FeeRouting::ToBudget {
            self.budget.add(amount)?;
            debug!(market = %self.market, side = %side, amount, "Fee sent to rebalance budget");
        }
        Ok(routing)
    }

    /// Credit both halves of `split` through [`Self::add_fees`].
    pub fn distribute(&mut self, split: SideSplit) -> VaultResult<Distribution> {
        let mut outcome = Distribution::default();
        for side in [Side::Yes, Side::No] {
            let amount = split.of(side);
            match self.add_fees(side, amount)? {
                FeeRouting::Accrued => match side {
                    Side::Yes => outcome.to_yes = amount,
                    Side::No => outcome.to_no = amount,
                },
                FeeRouting::ToBudget => outcome.to_budget += amount,
            }
        }
        Ok(outcome)
    }

    pub fn add_to_budget(&mut self, amount: u128) -> VaultResult<()> {
        self.budget.add(amount)
    }

    pub fn take_budget(&mut self) -> u128 {
        self.budget.take()
    }

    // ------------------------------------------------------------------
    // Inventory
    // ------------------------------------------------------------------

    /// Vault shares minted for depositing `amount` outcome shares on `side`.
    ///
    /// A side with no inventory mints 1:1, since its outstanding shares are
    /// retired on deposit.
    pub fn vault_shares_for(&self, side: Side, amount: u128) -> VaultResult<u128> {
        let total = self.positions.total_shares(side);
        let inventory = self.vault.shares(side);
        if total == 0 || inventory == 0 {
            return Ok(amount);
        }
        let minted =
            mul_div_u128(amount, total, inventory).ok_or(VaultError::Overflow("vault shares"))?;
        if minted == 0 {
            return Err(VaultError::invalid("deposit too small to mint vault shares"));
        }
        Ok(minted)
    }

    /// Add `amount` outcome shares to the vault for `provider`.
    ///
    /// Returns the vault shares minted.
    pub fn deposit(&mut self, provider: Address, side: Side, amount: u128, now: u32) -> VaultResult<u128> {
        if amount == 0 {
            return Err(VaultError::invalid("zero deposit"));
        }
        let minted = self.vault_shares_for(side, amount)?;
        if self.vault.shares(side) == 0 && self.positions.total_shares(side) > 0 {
            let retired = self
                .positions
                .retire_side(side, self.rewards.per_share(side))?;
            debug!(market = %self.market, side = %side, retired, "Drained side re-based");
        }
        self.positions
            .deposit(provider, side, minted, self.rewards.per_share(side), now)?;
        self.vault.adjust_side(side, amount, Sign::Increase)?;
        self.vault.touch_activity(now);
        Ok(minted)
    }

    /// Burn `vault_shares` for `provider` and pay out pending rewards.
    ///
    /// The cooldown applies until the market closes.
    pub fn withdraw(
        &mut self,
        provider: &Address,
        side: Side,
        vault_shares: u128,
        now: u64,
        cooldown_secs: u64,
    ) -> VaultResult<Withdrawal> {
        if vault_shares == 0 {
            return Err(VaultError::invalid("zero withdrawal"));
        }
        let position = self
            .positions
            .position(provider)
            .ok_or_else(|| VaultError::invalid("no vault position"))?;
        if position.shares(side) < vault_shares {
            return Err(VaultError::invalid("withdraw exceeds vault shares"));
        }
        if !self.is_closed(now) {
            let unlock = u64::from(position.last_deposit_time).saturating_add(cooldown_secs);
            if now < unlock {
                return Err(VaultError::Timing(TimingKind::CooldownActive {
                    remaining_secs: unlock - now,
                }));
            }
        }

        let total = self.positions.total_shares(side);
        let inventory = mul_div_u128(vault_shares, self.vault.shares(side), total)
            .ok_or(VaultError::Overflow("withdrawn inventory"))?;
        let fees = self
            .positions
            .withdraw(provider, side, vault_shares, self.rewards.per_share(side))?;
        self.vault.adjust_side(side, inventory, Sign::Decrease)?;
        self.vault.touch_activity(pmv_core::timestamp32(now)?);
        Ok(Withdrawal { inventory, fees })
    }

    /// Pay out pending rewards on `side`.
    pub fn harvest(&mut self, provider: &Address, side: Side) -> VaultResult<u128> {
        self.positions
            .harvest(provider, side, self.rewards.per_share(side))
    }

    /// Remove `amount` of `side` inventory (OTC fills).
    pub fn draw_inventory(&mut self, side: Side, amount: u128, now: u32) -> VaultResult<()> {
        self.vault.adjust_side(side, amount, Sign::Decrease)?;
        self.vault.touch_activity(now);
        Ok(())
    }

    /// Remove `amount` from both sides (pair merges).
    pub fn merge_inventory(&mut self, amount: u128, now: u32) -> VaultResult<()> {
        self.vault.adjust_side(Side::Yes, amount, Sign::Decrease)?;
        self.vault.adjust_side(Side::No, amount, Sign::Decrease)?;
        self.vault.touch_activity(now);
        Ok(())
    }

    /// Zero the vault record. Only allowed once no provider holds shares.
    pub fn finalize(&mut self, now: u32) -> VaultResult<()> {
        if self.positions.total_shares(Side::Yes) != 0 || self.positions.total_shares(Side::No) != 0 {
            return Err(VaultError::invalid("providers remain"));
        }
        self.vault = PackedVaultState::new(0, 0, now)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    const M: MarketId = MarketId(3);
    const CLOSE: u64 = 1_000_000;

    fn book() -> MarketBook {
        MarketBook::new(M, CLOSE, TwapObservation::new(100, U256::ZERO))
    }

    fn alice() -> Address {
        Address::repeat_byte(0xa1)
    }

    fn bob() -> Address {
        Address::repeat_byte(0xb0)
    }

    #[test]
    fn test_first_deposit_mints_one_to_one() {
        let mut b = book();
        assert_eq!(b.deposit(alice(), Side::Yes, 100, 200).unwrap(), 100);
        assert_eq!(b.inventory().yes, 100);
        assert_eq!(b.inventory().last_activity, 200);
        assert_eq!(b.total_shares(Side::Yes), 100);
    }

    #[test]
    fn test_deposit_after_inventory_drawn_mints_more_shares() {
        let mut b = book();
        b.deposit(alice(), Side::Yes, 100, 200).unwrap();
        b.draw_inventory(Side::Yes, 50, 300).unwrap();
        // 100 vault shares over 50 inventory
        assert_eq!(b.deposit(bob(), Side::Yes, 10, 400).unwrap(), 20);
    }

    #[test]
    fn test_deposit_into_drained_side_rebases() {
        let mut b = book();
        b.deposit(alice(), Side::No, 10, 200).unwrap();
        b.add_fees(Side::No, 4).unwrap();
        b.draw_inventory(Side::No, 10, 300).unwrap();

        assert_eq!(b.vault_shares_for(Side::No, 7).unwrap(), 7);
        assert_eq!(b.deposit(bob(), Side::No, 7, 400).unwrap(), 7);
        assert_eq!(b.total_shares(Side::No), 7);
        assert!(b.positions().is_conserved());

        // Alice keeps her fees but no longer shares in the new inventory
        assert_eq!(b.pending(&alice(), Side::No).unwrap(), 4);
        assert_eq!(b.positions().position(&alice()).unwrap().no_vault_shares, 0);
        b.add_fees(Side::No, 7).unwrap();
        assert_eq!(b.pending(&bob(), Side::No).unwrap(), 7);
        assert_eq!(b.pending(&alice(), Side::No).unwrap(), 4);

        let w = b.withdraw(&bob(), Side::No, 7, CLOSE, 0).unwrap();
        assert_eq!(w, Withdrawal { inventory: 7, fees: 7 });
    }

    #[test]
    fn test_withdraw_respects_cooldown() {
        let mut b = book();
        b.deposit(alice(), Side::Yes, 100, 200).unwrap();
        let err = b.withdraw(&alice(), Side::Yes, 100, 200 + 3_600, 86_400).unwrap_err();
        assert_eq!(
            err,
            VaultError::Timing(TimingKind::CooldownActive {
                remaining_secs: 86_400 - 3_600
            })
        );
        let w = b.withdraw(&alice(), Side::Yes, 100, 200 + 86_400, 86_400).unwrap();
        assert_eq!(w, Withdrawal { inventory: 100, fees: 0 });
        assert!(b.vault().is_empty());
    }

    #[test]
    fn test_cooldown_waived_after_close() {
        let mut b = book();
        b.deposit(alice(), Side::Yes, 100, 200).unwrap();
        assert!(b.withdraw(&alice(), Side::Yes, 100, CLOSE, 86_400).is_ok());
    }

    #[test]
    fn test_withdraw_returns_proportional_inventory_and_fees() {
        let mut b = book();
        b.deposit(alice(), Side::Yes, 100, 0).unwrap();
        b.deposit(bob(), Side::Yes, 300, 0).unwrap();
        b.draw_inventory(Side::Yes, 200, 10).unwrap();
        b.add_fees(Side::Yes, 80).unwrap();

        let w = b.withdraw(&alice(), Side::Yes, 100, 86_400, 86_400).unwrap();
        assert_eq!(w, Withdrawal { inventory: 50, fees: 20 });
        assert_eq!(b.pending(&bob(), Side::Yes).unwrap(), 60);
        assert!(b.positions().is_conserved());
    }

    #[test]
    fn test_fees_without_lps_go_to_budget() {
        let mut b = book();
        b.deposit(alice(), Side::Yes, 100, 0).unwrap();
        assert_eq!(b.add_fees(Side::No, 9).unwrap(), FeeRouting::ToBudget);
        assert_eq!(b.budget(), 9);
        assert_eq!(b.rewards().per_share(Side::No), U256::ZERO);
    }

    #[test]
    fn test_distribute_reports_destinations() {
        let mut b = book();
        b.deposit(alice(), Side::Yes, 100, 0).unwrap();
        let d = b.distribute(SideSplit { yes: 30, no: 12 }).unwrap();
        assert_eq!(d, Distribution { to_yes: 30, to_no: 0, to_budget: 12 });
        assert_eq!(d.to_lps(), 30);
    }

    #[test]
    fn test_close_window() {
        let b = book();
        assert!(!b.in_close_window(CLOSE - 3_601, 3_600));
        assert!(b.in_close_window(CLOSE - 3_600, 3_600));
        assert!(b.is_closed(CLOSE));
    }

    #[test]
    fn test_finalize_requires_no_providers() {
        let mut b = book();
        b.deposit(alice(), Side::Yes, 100, 0).unwrap();
        assert!(b.finalize(5).is_err());
        b.withdraw(&alice(), Side::Yes, 100, CLOSE, 0).unwrap();
        b.finalize(5).unwrap();
        assert_eq!(b.vault().word(), PackedVaultState::new(0, 0, 5).unwrap().word());
    }
}
