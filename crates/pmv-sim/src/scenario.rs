//! In-memory market the tables are replayed against.

use std::sync::Arc;

use pmv_core::{Address, Clock, InMemoryLedger, ManualClock, MarketId, OutcomeLedger, Side};
use pmv_oracle::{AmmPool, ConstantProductPool};
use pmv_router::{BuyOrder, BuyPlan, RouteSnapshot, Router, TradeOutcome};
use tracing::debug;

use crate::config::SimConfig;
use crate::error::{AppError, AppResult};

pub const MARKET: MarketId = MarketId(1);

const ROUTER: Address = Address::repeat_byte(0x70);
const POOL: Address = Address::repeat_byte(0x90);
const SEEDER: Address = Address::repeat_byte(0x5e);
const PROVIDER: Address = Address::repeat_byte(0xa1);
const TRADER: Address = Address::repeat_byte(0xb1);

/// Ledger, pool and router for one market, with a TWAP already recorded.
pub struct SimWorld {
    ledger: Arc<InMemoryLedger>,
    clock: Arc<ManualClock>,
    pool: Arc<ConstantProductPool>,
    router: Router,
}

impl SimWorld {
    /// Seed the pool, bootstrap the market, refresh the TWAP once and
    /// deposit the configured vault inventory.
    pub fn new(config: &SimConfig) -> AppResult<Self> {
        let ledger = Arc::new(InMemoryLedger::new());
        let clock = Arc::new(ManualClock::new(config.start_secs));
        let pool = Arc::new(ConstantProductPool::new(POOL, ledger.clone(), clock.clone()));
        let router = Router::new(
            config.router.clone(),
            ROUTER,
            ledger.clone(),
            pool.clone(),
            clock.clone(),
        )?;
        let world = Self {
            ledger,
            clock,
            pool,
            router,
        };

        let depth = config.scaled(config.pool_depth);
        world.mint_pairs(SEEDER, depth)?;
        world
            .pool
            .create(MARKET, config.pool_fee_bps, SEEDER, depth, depth)?;
        world.router.bootstrap_market(MARKET, config.close_time())?;

        world
            .clock
            .advance(u64::from(config.router.min_twap_update_interval_secs));
        if !world.router.update_twap_observation(MARKET)? {
            return Err(AppError::Config("TWAP did not advance after bootstrap".to_string()));
        }

        for (side, units) in [(Side::Yes, config.vault_yes), (Side::No, config.vault_no)] {
            let amount = config.scaled(units);
            if amount > 0 {
                world.mint_pairs(PROVIDER, amount)?;
                world.router.deposit_to_vault(PROVIDER, MARKET, side, amount)?;
            }
        }
        debug!(depth, vault_yes = config.vault_yes, vault_no = config.vault_no, "Simulated market ready");
        Ok(world)
    }

    fn mint_pairs(&self, who: Address, amount: u128) -> AppResult<()> {
        self.ledger.fund_collateral(who, amount)?;
        self.ledger.mint_pair(MARKET, amount, who, who)?;
        Ok(())
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Planner inputs as of now.
    pub fn snapshot(&self) -> AppResult<RouteSnapshot> {
        let book = self.router.book(MARKET)?;
        Ok(RouteSnapshot::from_book(
            &book,
            self.pool.reserves(MARKET),
            self.pool.fee_bps(MARKET),
            self.clock.now_secs(),
        ))
    }

    /// Quote a buy, then execute it for a freshly funded trader.
    pub fn buy(&self, side: Side, collateral_in: u128) -> AppResult<(BuyPlan, TradeOutcome)> {
        let plan = self.router.quote_buy(MARKET, side, collateral_in)?;
        self.ledger.fund_collateral(TRADER, collateral_in)?;
        let outcome = self.router.buy(
            TRADER,
            BuyOrder {
                market: MARKET,
                side,
                collateral_in,
                min_shares_out: plan.shares_out,
                deadline: self.clock.now_secs(),
            },
        )?;
        Ok((plan, outcome))
    }

    /// Shares of `side` held by the simulated trader.
    #[must_use]
    pub fn trader_shares(&self, side: Side) -> u128 {
        self.ledger.balance_of(MARKET, side, TRADER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_starts_with_twap_and_inventory() {
        let config = SimConfig::default();
        let world = SimWorld::new(&config).unwrap();
        assert_eq!(world.router().twap_bps(MARKET).unwrap(), Some(5_000));

        let snapshot = world.snapshot().unwrap();
        assert_eq!(snapshot.inventory.yes, config.scaled(100));
        assert_eq!(snapshot.inventory.no, config.scaled(100));
        assert_eq!(snapshot.spot_bps(), Some(5_000));
    }

    #[test]
    fn test_executed_buy_matches_quote() {
        let config = SimConfig::default();
        let world = SimWorld::new(&config).unwrap();
        let (plan, outcome) = world.buy(Side::No, config.scaled(50)).unwrap();
        assert_eq!(outcome.amount_out, plan.shares_out);
        assert_eq!(world.trader_shares(Side::No), plan.shares_out);
    }
}
