//! External constant-product pool seam and an in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use parking_lot::Mutex;
use pmv_core::{
    timestamp32, Clock, MarketId, OutcomeLedger, Savepoint, Side, Transactional, VaultError,
    VaultResult,
};
use tracing::{debug, warn};

use crate::amm::{amount_out, PoolReserves};

/// External YES/NO pool used as price source and fill venue.
pub trait AmmPool: Transactional {
    /// Current reserves, `None` if the market has no pool.
    fn reserves(&self, market: MarketId) -> Option<PoolReserves>;

    /// Swap fee in bps.
    fn fee_bps(&self, market: MarketId) -> u32;

    /// Live cumulative prices `(NO/YES, YES/NO)` as of `timestamp`,
    /// including the time elapsed since the pool last updated.
    fn cumulative_prices(&self, market: MarketId, timestamp: u32) -> Option<(U256, U256)>;

    /// Swap `amount_in` of `side_in` from `from`, paying the other side to `to`.
    fn swap(
        &self,
        market: MarketId,
        side_in: Side,
        amount_in: u128,
        min_out: u128,
        from: Address,
        to: Address,
    ) -> VaultResult<u128>;
}

#[derive(Debug, Clone)]
struct PoolState {
    reserves: PoolReserves,
    fee_bps: u32,
    price0_cumulative: U256,
    price1_cumulative: U256,
    last_update: u32,
}

impl PoolState {
    /// Accumulate prices up to `now`.
    fn accrue(&mut self, now: u32) {
        let elapsed = now.saturating_sub(self.last_update);
        if elapsed > 0 && self.reserves.yes > 0 && self.reserves.no > 0 {
            let yes = U256::from(self.reserves.yes);
            let no = U256::from(self.reserves.no);
            let dt = U256::from(elapsed);
            let price0 = (no << 112usize) / yes;
            let price1 = (yes << 112usize) / no;
            self.price0_cumulative = self.price0_cumulative.wrapping_add(price0.wrapping_mul(dt));
            self.price1_cumulative = self.price1_cumulative.wrapping_add(price1.wrapping_mul(dt));
        }
        if now > self.last_update {
            self.last_update = now;
        }
    }
}

/// In-memory constant-product pool holding its reserves in a shared ledger.
pub struct ConstantProductPool {
    address: Address,
    ledger: Arc<dyn OutcomeLedger>,
    clock: Arc<dyn Clock>,
    pools: Mutex<HashMap<MarketId, PoolState>>,
    savepoints: Mutex<Vec<HashMap<MarketId, PoolState>>>,
}

impl ConstantProductPool {
    pub fn new(address: Address, ledger: Arc<dyn OutcomeLedger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            address,
            ledger,
            clock,
            pools: Mutex::new(HashMap::new()),
            savepoints: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    fn now(&self) -> VaultResult<u32> {
        timestamp32(self.clock.now_secs())
    }

    /// Open a pool for `market` seeded with `yes`/`no` shares from `provider`.
    pub fn create(
        &self,
        market: MarketId,
        fee_bps: u32,
        provider: Address,
        yes: u128,
        no: u128,
    ) -> VaultResult<()> {
        if fee_bps >= pmv_core::math::BPS {
            return Err(VaultError::invalid("fee_bps out of range"));
        }
        if yes == 0 || no == 0 {
            return Err(VaultError::invalid("pool needs both sides"));
        }
        let now = self.now()?;
        let mut pools = self.pools.lock();
        if pools.contains_key(&market) {
            return Err(VaultError::invalid(format!("pool for market {} exists", market)));
        }
        self.ledger.transfer(market, Side::Yes, provider, self.address, yes)?;
        self.ledger.transfer(market, Side::No, provider, self.address, no)?;
        pools.insert(
            market,
            PoolState {
                reserves: PoolReserves::new(yes, no),
                fee_bps,
                price0_cumulative: U256::ZERO,
                price1_cumulative: U256::ZERO,
                last_update: now,
            },
        );
        debug!(%market, yes, no, fee_bps, "Pool created");
        Ok(())
    }
}

impl Transactional for ConstantProductPool {
    fn savepoint(&self) -> Savepoint {
        let snapshot = self.pools.lock().clone();
        let mut savepoints = self.savepoints.lock();
        savepoints.push(snapshot);
        Savepoint(savepoints.len() - 1)
    }

    fn rollback(&self, savepoint: Savepoint) {
        let mut savepoints = self.savepoints.lock();
        if savepoint.0 >= savepoints.len() {
            warn!(savepoint = savepoint.0, "Rollback to unknown pool savepoint ignored");
            return;
        }
        let snapshot = savepoints.drain(savepoint.0..).next();
        if let Some(snapshot) = snapshot {
            *self.pools.lock() = snapshot;
        }
    }

    fn release(&self, savepoint: Savepoint) {
        self.savepoints.lock().truncate(savepoint.0);
    }
}

impl AmmPool for ConstantProductPool {
    fn reserves(&self, market: MarketId) -> Option<PoolReserves> {
        self.pools.lock().get(&market).map(|p| p.reserves)
    }

    fn fee_bps(&self, market: MarketId) -> u32 {
        self.pools.lock().get(&market).map_or(0, |p| p.fee_bps)
    }

    fn cumulative_prices(&self, market: MarketId, timestamp: u32) -> Option<(U256, U256)> {
        let mut state = self.pools.lock().get(&market)?.clone();
        state.accrue(timestamp);
        Some((state.price0_cumulative, state.price1_cumulative))
    }

    fn swap(
        &self,
        market: MarketId,
        side_in: Side,
        amount_in: u128,
        min_out: u128,
        from: Address,
        to: Address,
    ) -> VaultResult<u128> {
        if amount_in == 0 {
            return Err(VaultError::invalid("zero swap amount"));
        }
        let now = self.now()?;
        let mut pools = self.pools.lock();
        let state = pools.get_mut(&market).ok_or(VaultError::UnknownMarket(market.0))?;
        state.accrue(now);

        let side_out = side_in.opposite();
        let reserve_in = state.reserves.of(side_in);
        let reserve_out = state.reserves.of(side_out);
        let out = amount_out(amount_in, reserve_in, reserve_out, state.fee_bps)
            .ok_or(VaultError::Overflow("swap output"))?;
        if out >= reserve_out {
            return Err(VaultError::illiquid("swap would drain pool"));
        }
        if out < min_out {
            return Err(VaultError::Slippage { got: out, min: min_out });
        }

        self.ledger.transfer(market, side_in, from, self.address, amount_in)?;
        self.ledger.transfer(market, side_out, self.address, to, out)?;

        let new_in = reserve_in
            .checked_add(amount_in)
            .ok_or(VaultError::Overflow("pool reserve"))?;
        state.reserves = match side_in {
            Side::Yes => PoolReserves::new(new_in, reserve_out - out),
            Side::No => PoolReserves::new(reserve_out - out, new_in),
        };
        debug!(%market, side_in = %side_in, amount_in, out, "Pool swap");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmv_core::{InMemoryLedger, ManualClock};

    const M: MarketId = MarketId(7);

    fn lp() -> Address {
        Address::repeat_byte(0x11)
    }

    fn trader() -> Address {
        Address::repeat_byte(0x22)
    }

    fn setup(yes: u128, no: u128) -> (Arc<InMemoryLedger>, Arc<ManualClock>, ConstantProductPool) {
        let ledger = Arc::new(InMemoryLedger::new());
        let clock = Arc::new(ManualClock::new(1_000));
        ledger.fund_collateral(lp(), yes.max(no)).unwrap();
        ledger.mint_pair(M, yes.max(no), lp(), lp()).unwrap();
        let pool = ConstantProductPool::new(Address::repeat_byte(0xaa), ledger.clone(), clock.clone());
        pool.create(M, 30, lp(), yes, no).unwrap();
        (ledger, clock, pool)
    }

    #[test]
    fn test_swap_moves_reserves_and_balances() {
        let (ledger, _clock, pool) = setup(1_000, 1_000);
        ledger.fund_collateral(trader(), 84).unwrap();
        ledger.mint_pair(M, 84, trader(), trader()).unwrap();

        let out = pool.swap(M, Side::No, 84, 0, trader(), trader()).unwrap();
        assert_eq!(out, 77);
        assert_eq!(pool.reserves(M), Some(PoolReserves::new(923, 1_084)));
        assert_eq!(ledger.balance_of(M, Side::Yes, trader()), 161);
        assert_eq!(ledger.balance_of(M, Side::No, trader()), 0);
        assert_eq!(ledger.balance_of(M, Side::Yes, pool.address()), 923);
    }

    #[test]
    fn test_swap_min_out_enforced() {
        let (ledger, _clock, pool) = setup(1_000, 1_000);
        ledger.fund_collateral(trader(), 84).unwrap();
        ledger.mint_pair(M, 84, trader(), trader()).unwrap();

        let err = pool.swap(M, Side::No, 84, 78, trader(), trader()).unwrap_err();
        assert_eq!(err, VaultError::Slippage { got: 77, min: 78 });
        assert_eq!(pool.reserves(M), Some(PoolReserves::new(1_000, 1_000)));
    }

    #[test]
    fn test_cumulative_prices_are_live_without_updates() {
        let (_ledger, clock, pool) = setup(100, 300);
        let (c0_start, _) = pool.cumulative_prices(M, 1_000).unwrap();
        assert_eq!(c0_start, U256::ZERO);

        clock.advance(7 * 24 * 3_600);
        let (c0, c1) = pool.cumulative_prices(M, 1_000 + 3_600).unwrap();
        assert_eq!(c0, U256::from(3u8) * (U256::from(1u8) << 112usize) * U256::from(3_600u32));
        assert!(c1 > U256::ZERO);
    }

    #[test]
    fn test_savepoint_rollback_restores_reserves() {
        let (ledger, _clock, pool) = setup(1_000, 1_000);
        ledger.fund_collateral(trader(), 50).unwrap();
        ledger.mint_pair(M, 50, trader(), trader()).unwrap();

        let sp = pool.savepoint();
        pool.swap(M, Side::Yes, 50, 0, trader(), trader()).unwrap();
        pool.rollback(sp);
        assert_eq!(pool.reserves(M), Some(PoolReserves::new(1_000, 1_000)));
    }

    #[test]
    fn test_create_rejects_duplicates_and_bad_fee() {
        let (_ledger, _clock, pool) = setup(1_000, 1_000);
        assert_eq!(pool.create(M, 30, lp(), 1, 1).unwrap_err().code(), "INVALID_PARAMETER");
        assert_eq!(
            pool.create(MarketId(8), 10_000, lp(), 1, 1).unwrap_err().code(),
            "INVALID_PARAMETER"
        );
    }
}
