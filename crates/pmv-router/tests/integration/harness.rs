//! Router wired to an in-memory ledger, pool and manual clock.

#![allow(dead_code)]

use std::sync::Arc;

use pmv_core::{Address, Clock, InMemoryLedger, ManualClock, MarketId, OutcomeLedger, Side};
use pmv_oracle::{AmmPool, ConstantProductPool, PoolReserves};
use pmv_router::{BuyOrder, Router, RouterConfig, SellOrder};

pub const ONE: u128 = 1_000_000;
pub const DAY: u64 = 86_400;
pub const START: u64 = 1_700_000_000;
pub const M: MarketId = MarketId(1);

pub const ROUTER: Address = Address::repeat_byte(0x70);
pub const POOL: Address = Address::repeat_byte(0x90);
pub const SEEDER: Address = Address::repeat_byte(0x5e);
pub const LP_YES: Address = Address::repeat_byte(0xa1);
pub const LP_NO: Address = Address::repeat_byte(0xa2);
pub const LP_OTHER: Address = Address::repeat_byte(0xa3);
pub const TRADER: Address = Address::repeat_byte(0xb1);
pub const KEEPER: Address = Address::repeat_byte(0xc1);

/// Every address the scenarios move collateral between.
pub const ACCOUNTS: [Address; 8] = [ROUTER, POOL, SEEDER, LP_YES, LP_NO, LP_OTHER, TRADER, KEEPER];

pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub clock: Arc<ManualClock>,
    pub pool: Arc<ConstantProductPool>,
    pub router: Arc<Router>,
    pub close_time: u64,
    /// Collateral created by `fund`, for conservation checks.
    pub funded: u128,
}

impl Harness {
    /// Balanced pool with `pool_depth` shares per side, market closing in
    /// 30 days, TWAP already at 50%.
    pub fn new(pool_depth: u128) -> Self {
        Self::with_config(pool_depth, RouterConfig::default())
    }

    pub fn with_config(pool_depth: u128, config: RouterConfig) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let clock = Arc::new(ManualClock::new(START));
        let pool = Arc::new(ConstantProductPool::new(POOL, ledger.clone(), clock.clone()));
        let router = Arc::new(
            Router::new(config, ROUTER, ledger.clone(), pool.clone(), clock.clone()).unwrap(),
        );
        let mut harness = Self {
            ledger,
            clock,
            pool,
            router,
            close_time: START + 30 * DAY,
            funded: 0,
        };

        harness.mint_pairs(SEEDER, pool_depth);
        harness.pool.create(M, 30, SEEDER, pool_depth, pool_depth).unwrap();
        harness.router.bootstrap_market(M, harness.close_time).unwrap();
        harness.clock.advance(1_800);
        assert!(harness.router.update_twap_observation(M).unwrap());
        assert_eq!(harness.router.twap_bps(M).unwrap(), Some(5_000));
        harness
    }

    pub fn now(&self) -> u64 {
        self.clock.now_secs()
    }

    pub fn fund(&mut self, who: Address, amount: u128) {
        self.ledger.fund_collateral(who, amount).unwrap();
        self.funded += amount;
    }

    /// Give `who` `amount` YES and `amount` NO.
    pub fn mint_pairs(&mut self, who: Address, amount: u128) {
        self.fund(who, amount);
        self.ledger.mint_pair(M, amount, who, who).unwrap();
    }

    /// Mint pairs for `who` and deposit one side into the vault.
    pub fn deposit(&mut self, who: Address, side: Side, amount: u128) -> u128 {
        self.mint_pairs(who, amount);
        self.router.deposit_to_vault(who, M, side, amount).unwrap()
    }

    pub fn buy_order(&self, side: Side, collateral_in: u128) -> BuyOrder {
        BuyOrder {
            market: M,
            side,
            collateral_in,
            min_shares_out: 0,
            deadline: self.now() + 60,
        }
    }

    pub fn sell_order(&self, side: Side, shares_in: u128) -> SellOrder {
        SellOrder {
            market: M,
            side,
            shares_in,
            min_collateral_out: 0,
            deadline: self.now() + 60,
        }
    }

    pub fn shares(&self, who: Address, side: Side) -> u128 {
        self.ledger.balance_of(M, side, who)
    }

    pub fn collateral(&self, who: Address) -> u128 {
        self.ledger.collateral_of(who)
    }

    pub fn pool_reserves(&self) -> Option<PoolReserves> {
        self.pool.reserves(M)
    }

    /// Collateral held by all accounts plus collateral locked in pairs.
    pub fn total_collateral(&self) -> u128 {
        ACCOUNTS.iter().map(|a| self.collateral(*a)).sum::<u128>() + self.ledger.locked_collateral(M)
    }
}
