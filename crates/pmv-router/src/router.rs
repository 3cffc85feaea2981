//! Router entry points.
//!
//! Every state-changing entry point runs through [`Router::atomically`]:
//!
//! 1. enter the reentrancy guard (rejects before anything is read)
//! 2. open ledger and pool savepoints
//! 3. run the operation against a private copy of the store
//! 4. pay refunds
//! 5. on success swap the copy in and release the savepoints, on failure
//!    roll both collaborators back and drop the copy

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use parking_lot::RwLock;
use pmv_core::{
    Clock, ExecutionSource, MarketId, OutcomeLedger, Side, VaultError, VaultResult,
};
use pmv_oracle::{AmmPool, TwapOracle};
use pmv_telemetry::Metrics;
use pmv_vault::{MarketBook, VaultInventory, VaultPosition, VaultStore, Withdrawal};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RouterConfig;
use crate::context::OpContext;
use crate::guard::ReentrancyGuard;
use crate::planner::{plan_buy, plan_sell, BuyPlan, RouteSnapshot, SellPlan};

/// Buy `side` shares with collateral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyOrder {
    pub market: MarketId,
    pub side: Side,
    pub collateral_in: u128,
    pub min_shares_out: u128,
    /// Last second (inclusive) at which the order may execute.
    pub deadline: u64,
}

/// Sell `side` shares for collateral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellOrder {
    pub market: MarketId,
    pub side: Side,
    pub shares_in: u128,
    pub min_collateral_out: u128,
    pub deadline: u64,
}

/// Result of a buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOutcome {
    /// Shares delivered (buy) or collateral paid (sell).
    pub amount_out: u128,
    pub source: ExecutionSource,
    /// Vault shares credited to the trader by a mint or a vault deposit.
    pub vault_shares_minted: u128,
}

/// Vault, oracle and best-execution router for binary markets.
pub struct Router {
    pub(crate) config: RouterConfig,
    /// Custody address for vault inventory, fees and the budget.
    pub(crate) address: Address,
    pub(crate) ledger: Arc<dyn OutcomeLedger>,
    pub(crate) pool: Arc<dyn AmmPool>,
    pub(crate) clock: Arc<dyn Clock>,
    store: RwLock<VaultStore>,
    guard: ReentrancyGuard,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("address", &self.address)
            .field("markets", &self.store.read().markets())
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Create a router that holds custody at `address`.
    pub fn new(
        config: RouterConfig,
        address: Address,
        ledger: Arc<dyn OutcomeLedger>,
        pool: Arc<dyn AmmPool>,
        clock: Arc<dyn Clock>,
    ) -> VaultResult<Self> {
        config.validate().map_err(VaultError::InvalidParameter)?;
        if address == Address::ZERO {
            return Err(VaultError::invalid("router address is zero"));
        }
        Ok(Self {
            config,
            address,
            ledger,
            pool,
            clock,
            store: RwLock::new(VaultStore::new()),
            guard: ReentrancyGuard::new(),
        })
    }

    // ========================================================================
    // Atomic scope
    // ========================================================================

    /// Run `operation` all-or-nothing under the reentrancy guard.
    pub(crate) fn atomically<T>(
        &self,
        name: &'static str,
        operation: impl FnOnce(&mut VaultStore, &mut OpContext) -> VaultResult<T>,
    ) -> VaultResult<T> {
        let _token = self.guard.enter()?;

        let ledger_savepoint = self.ledger.savepoint();
        let pool_savepoint = self.pool.savepoint();
        let mut scratch = self.store.read().clone();
        let mut ctx = OpContext::new();

        let result = operation(&mut scratch, &mut ctx).and_then(|value| {
            self.pay_refunds(&mut ctx)?;
            Ok(value)
        });

        match result {
            Ok(value) => {
                *self.store.write() = scratch;
                self.pool.release(pool_savepoint);
                self.ledger.release(ledger_savepoint);
                ctx.publish();
                Ok(value)
            }
            Err(err) => {
                self.pool.rollback(pool_savepoint);
                self.ledger.rollback(ledger_savepoint);
                warn!(operation = name, code = err.code(), error = %err, "Operation rolled back");
                Metrics::operation_error(name, err.code());
                Err(err)
            }
        }
    }

    fn pay_refunds(&self, ctx: &mut OpContext) -> VaultResult<()> {
        for (recipient, amount) in ctx.take_refunds() {
            self.ledger.send_refund(
                self.address,
                recipient,
                amount,
                self.config.refund_gas_stipend,
            )?;
            debug!(recipient = %recipient, amount, "Refund paid");
        }
        Ok(())
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.now_secs()
    }

    pub(crate) fn snapshot(&self, book: &MarketBook, now: u64) -> RouteSnapshot {
        let market = book.market();
        RouteSnapshot::from_book(book, self.pool.reserves(market), self.pool.fee_bps(market), now)
    }

    // ========================================================================
    // Markets
    // ========================================================================

    /// Create the vault record, position ledger and first TWAP observation.
    pub fn bootstrap_market(&self, market: MarketId, close_time: u64) -> VaultResult<()> {
        let now = self.now();
        self.atomically("bootstrap_market", |store, _| {
            self.bootstrap_in(store, now, market, close_time)
        })
    }

    /// Zero the vault record once no provider remains.
    pub fn finalize_market(&self, market: MarketId) -> VaultResult<()> {
        let now = self.now();
        self.atomically("finalize_market", |store, ctx| {
            self.finalize_in(store, ctx, now, market)
        })
    }

    // ========================================================================
    // Liquidity providers
    // ========================================================================

    /// Deposit outcome shares into the vault. Returns vault shares minted.
    pub fn deposit_to_vault(
        &self,
        provider: Address,
        market: MarketId,
        side: Side,
        shares: u128,
    ) -> VaultResult<u128> {
        let now = self.now();
        self.atomically("deposit_to_vault", |store, ctx| {
            self.deposit_in(store, ctx, now, provider, market, side, shares)
        })
    }

    /// Burn vault shares for inventory and pending fees.
    pub fn withdraw_from_vault(
        &self,
        provider: Address,
        market: MarketId,
        side: Side,
        vault_shares: u128,
    ) -> VaultResult<Withdrawal> {
        let now = self.now();
        self.atomically("withdraw_from_vault", |store, ctx| {
            self.withdraw_in(store, ctx, now, provider, market, side, vault_shares)
        })
    }

    /// Pay out pending fees without touching the position.
    pub fn harvest_vault_fees(&self, provider: Address, market: MarketId, side: Side) -> VaultResult<u128> {
        self.atomically("harvest_vault_fees", |store, _| {
            self.harvest_in(store, provider, market, side)
        })
    }

    // ========================================================================
    // Trading
    // ========================================================================

    pub fn buy(&self, buyer: Address, order: BuyOrder) -> VaultResult<TradeOutcome> {
        let now = self.now();
        self.atomically("buy", |store, ctx| self.buy_in(store, ctx, now, buyer, order))
    }

    pub fn sell(&self, seller: Address, order: SellOrder) -> VaultResult<TradeOutcome> {
        let now = self.now();
        self.atomically("sell", |store, ctx| self.sell_in(store, ctx, now, seller, order))
    }

    /// Venue split a buy would get right now. Read-only.
    pub fn quote_buy(&self, market: MarketId, side: Side, collateral_in: u128) -> VaultResult<BuyPlan> {
        let store = self.store.read();
        let book = store.get(market)?;
        plan_buy(&self.config, &self.snapshot(book, self.now()), side, collateral_in)
    }

    /// Venue split a sell would get right now. Read-only.
    pub fn quote_sell(&self, market: MarketId, side: Side, shares_in: u128) -> VaultResult<SellPlan> {
        let store = self.store.read();
        let book = store.get(market)?;
        plan_sell(&self.config, &self.snapshot(book, self.now()), side, shares_in)
    }

    // ========================================================================
    // Maintenance (permissionless)
    // ========================================================================

    /// Record a new TWAP observation if the refresh interval has passed.
    pub fn update_twap_observation(&self, market: MarketId) -> VaultResult<bool> {
        let now = self.now();
        self.atomically("update_twap_observation", |store, ctx| {
            self.update_twap_in(store, ctx, now, market)
        })
    }

    /// Merge paired inventory; the caller earns the bounty. Returns pairs
    /// merged, 0 when nothing pairs up.
    pub fn rebalance_vault(&self, caller: Address, market: MarketId) -> VaultResult<u128> {
        let now = self.now();
        self.atomically("rebalance_vault", |store, ctx| {
            self.rebalance_in(store, ctx, now, caller, market)
        })
    }

    /// After close: merge what pairs up and hand the budget to providers.
    /// Returns collateral credited to providers.
    pub fn settle_rebalance_budget(&self, market: MarketId) -> VaultResult<u128> {
        let now = self.now();
        self.atomically("settle_rebalance_budget", |store, ctx| {
            self.settle_in(store, ctx, now, market)
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Whether a guarded operation is in progress.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.guard.is_entered()
    }

    #[must_use]
    pub fn markets(&self) -> Vec<MarketId> {
        self.store.read().markets()
    }

    /// Copy of a market's full state.
    pub fn book(&self, market: MarketId) -> VaultResult<MarketBook> {
        self.store.read().get(market).cloned()
    }

    pub fn vault_inventory(&self, market: MarketId) -> VaultResult<VaultInventory> {
        self.store.read().get(market).map(MarketBook::inventory)
    }

    pub fn twap_bps(&self, market: MarketId) -> VaultResult<Option<u32>> {
        self.store.read().get(market).map(|b| b.twap().twap_bps())
    }

    pub fn twap_oracle(&self, market: MarketId) -> VaultResult<TwapOracle> {
        self.store.read().get(market).map(|b| b.twap().clone())
    }

    /// `(acc_yes_per_share, acc_no_per_share)`, scaled by 1e18.
    pub fn accumulators(&self, market: MarketId) -> VaultResult<(U256, U256)> {
        self.store.read().get(market).map(|b| {
            (
                b.rewards().per_share(Side::Yes),
                b.rewards().per_share(Side::No),
            )
        })
    }

    pub fn rebalance_budget(&self, market: MarketId) -> VaultResult<u128> {
        self.store.read().get(market).map(MarketBook::budget)
    }

    pub fn total_vault_shares(&self, market: MarketId, side: Side) -> VaultResult<u128> {
        self.store.read().get(market).map(|b| b.total_shares(side))
    }

    pub fn position(&self, market: MarketId, provider: &Address) -> VaultResult<Option<VaultPosition>> {
        self.store
            .read()
            .get(market)
            .map(|b| b.positions().position(provider).cloned())
    }

    pub fn pending_fees(&self, market: MarketId, provider: &Address, side: Side) -> VaultResult<u128> {
        self.store.read().get(market)?.pending(provider, side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::predicate::eq;
    use pmv_core::{InMemoryLedger, ManualClock, Savepoint, Transactional};
    use pmv_oracle::PoolReserves;

    mock! {
        pub Pool {}

        impl Transactional for Pool {
            fn savepoint(&self) -> Savepoint;
            fn rollback(&self, savepoint: Savepoint);
            fn release(&self, savepoint: Savepoint);
        }

        impl AmmPool for Pool {
            fn reserves(&self, market: MarketId) -> Option<PoolReserves>;
            fn fee_bps(&self, market: MarketId) -> u32;
            fn cumulative_prices(&self, market: MarketId, timestamp: u32) -> Option<(U256, U256)>;
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
    }

    const M: MarketId = MarketId(7);
    const START: u64 = 1_700_000_000;
    const DAY: u64 = 86_400;

    fn router_address() -> Address {
        Address::repeat_byte(0x70)
    }

    /// Pool whose `NO/YES` ratio is pinned at 1 (P(YES) = 50%).
    fn balanced_pool() -> MockPool {
        let mut pool = MockPool::new();
        pool.expect_savepoint().returning(|| Savepoint(0));
        pool.expect_cumulative_prices()
            .with(eq(M), mockall::predicate::always())
            .returning(|_, ts| Some((U256::from(ts) << 112usize, U256::ZERO)));
        pool
    }

    fn router(pool: MockPool, clock: Arc<ManualClock>) -> Router {
        Router::new(
            RouterConfig::default(),
            router_address(),
            Arc::new(InMemoryLedger::new()),
            Arc::new(pool),
            clock,
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_zero_address_and_bad_config() {
        let clock = Arc::new(ManualClock::new(START));
        let err = Router::new(
            RouterConfig::default(),
            Address::ZERO,
            Arc::new(InMemoryLedger::new()),
            Arc::new(MockPool::new()),
            clock.clone(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMETER");

        let config = RouterConfig {
            max_vault_fill_pct: 0,
            ..RouterConfig::default()
        };
        let err = Router::new(
            config,
            router_address(),
            Arc::new(InMemoryLedger::new()),
            Arc::new(MockPool::new()),
            clock,
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_bootstrap_without_pool_rolls_back() {
        let mut pool = MockPool::new();
        pool.expect_savepoint().times(1).returning(|| Savepoint(3));
        pool.expect_cumulative_prices().returning(|_, _| None);
        pool.expect_rollback().with(eq(Savepoint(3))).times(1).return_const(());
        pool.expect_release().never();

        let router = router(pool, Arc::new(ManualClock::new(START)));
        let err = router.bootstrap_market(M, START + DAY).unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMETER");
        assert!(router.markets().is_empty());
        assert!(!router.is_busy());
    }

    #[test]
    fn test_bootstrap_rejects_past_close_and_duplicates() {
        let mut pool = balanced_pool();
        pool.expect_release().return_const(());
        pool.expect_rollback().return_const(());
        let router = router(pool, Arc::new(ManualClock::new(START)));

        assert!(router.bootstrap_market(M, START).is_err());
        router.bootstrap_market(M, START + DAY).unwrap();
        assert!(router.bootstrap_market(M, START + 2 * DAY).is_err());
        assert_eq!(router.markets(), vec![M]);
        assert_eq!(router.twap_bps(M).unwrap(), None);
    }

    #[test]
    fn test_update_twap_reads_live_cumulative() {
        let mut pool = balanced_pool();
        pool.expect_release().times(4).return_const(());
        pool.expect_rollback().never();
        let clock = Arc::new(ManualClock::new(START));
        let router = router(pool, clock.clone());

        router.bootstrap_market(M, START + 30 * DAY).unwrap();
        clock.advance(600);
        assert!(!router.update_twap_observation(M).unwrap());

        clock.advance(1_200);
        assert!(router.update_twap_observation(M).unwrap());
        assert_eq!(router.twap_bps(M).unwrap(), Some(5_000));

        // Same second: interval not yet elapsed
        assert!(!router.update_twap_observation(M).unwrap());
        let oracle = router.twap_oracle(M).unwrap();
        assert_eq!(oracle.newest().timestamp, (START + 1_800) as u32);
        assert_eq!(oracle.oldest().map(|o| o.timestamp), Some(START as u32));
    }

    #[test]
    fn test_unknown_market_is_rejected() {
        let mut pool = balanced_pool();
        pool.expect_rollback().times(1).return_const(());
        let router = router(pool, Arc::new(ManualClock::new(START)));

        let err = router.update_twap_observation(MarketId(99)).unwrap_err();
        assert_eq!(err, VaultError::UnknownMarket(99));
        assert!(router.quote_buy(MarketId(99), Side::Yes, 1).is_err());
    }
}
