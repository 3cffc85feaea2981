//! Operation bodies. Each runs inside an atomic scope on a scratch store.

use alloy::primitives::{Address, U256};
use pmv_core::{
    timestamp32, ExecutionSource, MarketId, Side, TimingKind, VaultError, VaultResult,
};
use pmv_oracle::TwapObservation;
use pmv_vault::rebalance::share_notional_weights;
use pmv_vault::{
    plan_rebalance, split_by_weight, Distribution, FeeRouting, MarketBook, SideSplit, VaultStore,
    Withdrawal,
};
use tracing::{debug, info};

use crate::context::{Direction, OpContext, RouterEvent};
use crate::planner::{plan_buy, plan_sell, AmmSellFill, OtcBuyFill, OtcSellFill, SpreadIncome};
use crate::router::{BuyOrder, Router, SellOrder, TradeOutcome};

/// P(YES) used to weight distributions before the TWAP is available.
const NEUTRAL_PRICE_BPS: u32 = 5_000;

fn require_address(who: &Address) -> VaultResult<()> {
    if *who == Address::ZERO {
        return Err(VaultError::invalid("zero address"));
    }
    Ok(())
}

fn require_open(book: &MarketBook, now: u64) -> VaultResult<()> {
    if book.is_closed(now) {
        return Err(VaultError::Timing(TimingKind::MarketClosed));
    }
    Ok(())
}

fn require_deadline(now: u64, deadline: u64) -> VaultResult<()> {
    if now > deadline {
        return Err(VaultError::Expired { now, deadline });
    }
    Ok(())
}

fn record_state(ctx: &mut OpContext, book: &MarketBook) {
    let inventory = book.inventory();
    ctx.record(RouterEvent::VaultState {
        market: book.market(),
        yes: inventory.yes,
        no: inventory.no,
        budget: book.budget(),
    });
}

impl Router {
    // ========================================================================
    // Fee plumbing
    // ========================================================================

    fn credit_fees(&self, book: &mut MarketBook, ctx: &mut OpContext, side: Side, amount: u128) -> VaultResult<()> {
        if book.add_fees(side, amount)? == FeeRouting::ToBudget {
            ctx.record(RouterEvent::OrphanedFee { side, amount });
        }
        Ok(())
    }

    fn distribute(&self, book: &mut MarketBook, ctx: &mut OpContext, split: SideSplit) -> VaultResult<Distribution> {
        let outcome = book.distribute(split)?;
        if split.yes > 0 && outcome.to_yes == 0 {
            ctx.record(RouterEvent::OrphanedFee {
                side: Side::Yes,
                amount: split.yes,
            });
        }
        if split.no > 0 && outcome.to_no == 0 {
            ctx.record(RouterEvent::OrphanedFee {
                side: Side::No,
                amount: split.no,
            });
        }
        Ok(outcome)
    }

    fn credit_spread(&self, book: &mut MarketBook, ctx: &mut OpContext, spread: &SpreadIncome) -> VaultResult<()> {
        let outcome = self.distribute(book, ctx, spread.lp_split())?;
        book.add_to_budget(spread.to_budget)?;
        ctx.record(RouterEvent::SpreadFee {
            destination: "lp_yes",
            amount: outcome.to_yes,
        });
        ctx.record(RouterEvent::SpreadFee {
            destination: "lp_no",
            amount: outcome.to_no,
        });
        ctx.record(RouterEvent::SpreadFee {
            destination: "budget",
            amount: spread.to_budget + outcome.to_budget,
        });
        Ok(())
    }

    fn distribution_weights(book: &MarketBook) -> (U256, U256) {
        let p_yes = book.twap().twap_bps().unwrap_or(NEUTRAL_PRICE_BPS);
        share_notional_weights(book.total_shares(Side::Yes), book.total_shares(Side::No), p_yes)
    }

    // ========================================================================
    // Markets
    // ========================================================================

    pub(crate) fn bootstrap_in(
        &self,
        store: &mut VaultStore,
        now: u64,
        market: MarketId,
        close_time: u64,
    ) -> VaultResult<()> {
        if close_time <= now {
            return Err(VaultError::invalid("close_time must be in the future"));
        }
        if store.contains(market) {
            return Err(VaultError::invalid(format!("market {market} already bootstrapped")));
        }
        let timestamp = timestamp32(now)?;
        let (cumulative, _) = self
            .pool
            .cumulative_prices(market, timestamp)
            .ok_or_else(|| VaultError::invalid(format!("no pool for market {market}")))?;
        store.insert(MarketBook::new(
            market,
            close_time,
            TwapObservation::new(timestamp, cumulative),
        ))?;
        info!(%market, close_time, "Market bootstrapped");
        Ok(())
    }

    pub(crate) fn finalize_in(
        &self,
        store: &mut VaultStore,
        ctx: &mut OpContext,
        now: u64,
        market: MarketId,
    ) -> VaultResult<()> {
        let book = store.get_mut(market)?;
        book.finalize(timestamp32(now)?)?;
        record_state(ctx, book);
        info!(%market, "Market finalized");
        Ok(())
    }

    // ========================================================================
    // Liquidity providers
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn deposit_in(
        &self,
        store: &mut VaultStore,
        ctx: &mut OpContext,
        now: u64,
        provider: Address,
        market: MarketId,
        side: Side,
        shares: u128,
    ) -> VaultResult<u128> {
        require_address(&provider)?;
        if shares == 0 {
            return Err(VaultError::invalid("zero deposit"));
        }
        let book = store.get_mut(market)?;
        require_open(book, now)?;

        self.ledger.transfer(market, side, provider, self.address, shares)?;
        let minted = book.deposit(provider, side, shares, timestamp32(now)?)?;
        record_state(ctx, book);
        info!(%market, provider = %provider, side = %side, shares, minted, "Vault deposit");
        Ok(minted)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn withdraw_in(
        &self,
        store: &mut VaultStore,
        ctx: &mut OpContext,
        now: u64,
        provider: Address,
        market: MarketId,
        side: Side,
        vault_shares: u128,
    ) -> VaultResult<Withdrawal> {
        require_address(&provider)?;
        let book = store.get_mut(market)?;
        let withdrawal = book.withdraw(
            &provider,
            side,
            vault_shares,
            now,
            self.config.vault.withdraw_cooldown_secs,
        )?;

        if withdrawal.inventory > 0 {
            self.ledger
                .transfer(market, side, self.address, provider, withdrawal.inventory)?;
        }
        if withdrawal.fees > 0 {
            self.ledger
                .transfer_collateral(self.address, provider, withdrawal.fees)?;
        }
        record_state(ctx, book);
        info!(
            %market,
            provider = %provider,
            side = %side,
            vault_shares,
            inventory = withdrawal.inventory,
            fees = withdrawal.fees,
            "Vault withdrawal"
        );
        Ok(withdrawal)
    }

    pub(crate) fn harvest_in(
        &self,
        store: &mut VaultStore,
        provider: Address,
        market: MarketId,
        side: Side,
    ) -> VaultResult<u128> {
        let book = store.get_mut(market)?;
        let paid = book.harvest(&provider, side)?;
        if paid > 0 {
            self.ledger.transfer_collateral(self.address, provider, paid)?;
        }
        debug!(%market, provider = %provider, side = %side, paid, "Fees harvested");
        Ok(paid)
    }

    // ========================================================================
    // Buy
    // ========================================================================

    pub(crate) fn buy_in(
        &self,
        store: &mut VaultStore,
        ctx: &mut OpContext,
        now: u64,
        buyer: Address,
        order: BuyOrder,
    ) -> VaultResult<TradeOutcome> {
        require_address(&buyer)?;
        require_deadline(now, order.deadline)?;
        if order.collateral_in == 0 {
            return Err(VaultError::invalid("zero collateral"));
        }
        let market = order.market;
        let side = order.side;
        let book = store.get_mut(market)?;
        require_open(book, now)?;

        let plan = plan_buy(&self.config, &self.snapshot(book, now), side, order.collateral_in)?;
        let source = plan
            .source()
            .ok_or_else(|| VaultError::illiquid("no venue can fill the buy"))?;
        if plan.shares_out < order.min_shares_out {
            return Err(VaultError::Slippage {
                got: plan.shares_out,
                min: order.min_shares_out,
            });
        }

        self.ledger
            .transfer_collateral(buyer, self.address, order.collateral_in)?;
        let timestamp = timestamp32(now)?;
        let mut delivered = 0u128;
        let mut vault_shares_minted = 0u128;

        if let Some(fill) = plan.otc {
            delivered += self.fill_otc_buy(book, ctx, buyer, side, &fill, timestamp)?;
        }

        if let Some(mint) = plan.mint {
            self.ledger
                .mint_pair(market, mint.collateral, self.address, self.address)?;
            self.ledger
                .transfer(market, side, self.address, buyer, mint.collateral)?;
            vault_shares_minted = book.deposit(buyer, side.opposite(), mint.collateral, timestamp)?;
            delivered += mint.collateral;
            ctx.record(RouterEvent::Fill {
                venue: ExecutionSource::Mint,
                side,
                direction: Direction::Buy,
                collateral: mint.collateral,
            });
        }

        if let Some(quote) = plan.amm {
            self.ledger
                .mint_pair(market, quote.collateral_in, self.address, self.address)?;
            let out = self.pool.swap(
                market,
                side.opposite(),
                quote.collateral_in,
                quote.swap_out,
                self.address,
                self.address,
            )?;
            let shares = quote
                .collateral_in
                .checked_add(out)
                .ok_or(VaultError::Overflow("amm shares"))?;
            self.ledger.transfer(market, side, self.address, buyer, shares)?;
            delivered += shares;
            ctx.record(RouterEvent::Fill {
                venue: ExecutionSource::Amm,
                side,
                direction: Direction::Buy,
                collateral: quote.collateral_in,
            });
        }

        if delivered < order.min_shares_out {
            return Err(VaultError::Slippage {
                got: delivered,
                min: order.min_shares_out,
            });
        }
        ctx.add_refund(buyer, plan.refund)?;
        record_state(ctx, book);

        info!(
            %market,
            buyer = %buyer,
            side = %side,
            collateral_in = order.collateral_in,
            shares_out = delivered,
            refund = plan.refund,
            venue = %source,
            "Buy executed"
        );
        Ok(TradeOutcome {
            amount_out: delivered,
            source,
            vault_shares_minted,
        })
    }

    fn fill_otc_buy(
        &self,
        book: &mut MarketBook,
        ctx: &mut OpContext,
        buyer: Address,
        side: Side,
        fill: &OtcBuyFill,
        timestamp: u32,
    ) -> VaultResult<u128> {
        book.draw_inventory(side, fill.shares, timestamp)?;
        self.ledger
            .transfer(book.market(), side, self.address, buyer, fill.shares)?;
        self.credit_fees(book, ctx, side, fill.principal)?;
        self.credit_spread(book, ctx, &fill.spread)?;
        ctx.record(RouterEvent::Fill {
            venue: ExecutionSource::Otc,
            side,
            direction: Direction::Buy,
            collateral: fill.collateral,
        });
        debug!(
            market = %book.market(),
            shares = fill.shares,
            ask_bps = fill.ask_bps,
            spread = fill.spread.total,
            "OTC buy fill"
        );
        Ok(fill.shares)
    }

    // ========================================================================
    // Sell
    // ========================================================================

    pub(crate) fn sell_in(
        &self,
        store: &mut VaultStore,
        ctx: &mut OpContext,
        now: u64,
        seller: Address,
        order: SellOrder,
    ) -> VaultResult<TradeOutcome> {
        require_address(&seller)?;
        require_deadline(now, order.deadline)?;
        if order.shares_in == 0 {
            return Err(VaultError::invalid("zero shares"));
        }
        let market = order.market;
        let side = order.side;
        let book = store.get_mut(market)?;
        require_open(book, now)?;

        let plan = plan_sell(&self.config, &self.snapshot(book, now), side, order.shares_in)?;
        let source = match plan.source() {
            Some(source) if plan.collateral_out > 0 || plan.deposit.is_some() => source,
            _ => return Err(VaultError::illiquid("no venue can fill the sell")),
        };
        if plan.collateral_out < order.min_collateral_out {
            return Err(VaultError::Slippage {
                got: plan.collateral_out,
                min: order.min_collateral_out,
            });
        }

        self.ledger
            .transfer(market, side, seller, self.address, order.shares_in)?;
        let timestamp = timestamp32(now)?;
        let mut paid = 0u128;
        let mut vault_shares_minted = 0u128;

        if let Some(fill) = plan.otc {
            paid += self.fill_otc_sell(book, ctx, seller, side, &fill, timestamp)?;
        }

        if let Some(fill) = plan.amm {
            paid += self.fill_amm_sell(book.market(), ctx, seller, side, &fill)?;
        }

        if let Some(deposit) = plan.deposit {
            vault_shares_minted = book.deposit(seller, side, deposit.shares, timestamp)?;
            ctx.record(RouterEvent::Fill {
                venue: ExecutionSource::Vault,
                side,
                direction: Direction::Sell,
                collateral: 0,
            });
        }

        if plan.returned > 0 {
            self.ledger
                .transfer(market, side, self.address, seller, plan.returned)?;
        }

        if paid < order.min_collateral_out {
            return Err(VaultError::Slippage {
                got: paid,
                min: order.min_collateral_out,
            });
        }
        record_state(ctx, book);

        info!(
            %market,
            seller = %seller,
            side = %side,
            shares_in = order.shares_in,
            collateral_out = paid,
            vault_shares_minted,
            venue = %source,
            "Sell executed"
        );
        Ok(TradeOutcome {
            amount_out: paid,
            source,
            vault_shares_minted,
        })
    }

    fn fill_otc_sell(
        &self,
        book: &mut MarketBook,
        ctx: &mut OpContext,
        seller: Address,
        side: Side,
        fill: &OtcSellFill,
        timestamp: u32,
    ) -> VaultResult<u128> {
        let market = book.market();
        let counter = side.opposite();
        book.draw_inventory(counter, fill.shares, timestamp)?;
        self.ledger
            .merge_pair(market, fill.shares, self.address, self.address)?;
        if fill.proceeds > 0 {
            self.ledger
                .transfer_collateral(self.address, seller, fill.proceeds)?;
        }
        self.credit_fees(book, ctx, counter, fill.principal)?;
        self.credit_spread(book, ctx, &fill.spread)?;
        ctx.record(RouterEvent::Fill {
            venue: ExecutionSource::Otc,
            side,
            direction: Direction::Sell,
            collateral: fill.proceeds,
        });
        debug!(
            %market,
            shares = fill.shares,
            bid_bps = fill.bid_bps,
            spread = fill.spread.total,
            "OTC sell fill"
        );
        Ok(fill.proceeds)
    }

    fn fill_amm_sell(
        &self,
        market: MarketId,
        ctx: &mut OpContext,
        seller: Address,
        side: Side,
        fill: &AmmSellFill,
    ) -> VaultResult<u128> {
        let counter = side.opposite();
        let swap_in = fill.quote.swap_in;
        let out = self.pool.swap(
            market,
            side,
            swap_in,
            fill.quote.swap_out,
            self.address,
            self.address,
        )?;
        let kept = fill.shares_in - swap_in;
        let merged = kept.min(out);
        if merged > 0 {
            self.ledger
                .merge_pair(market, merged, self.address, self.address)?;
            self.ledger
                .transfer_collateral(self.address, seller, merged)?;
        }
        if kept > merged {
            self.ledger
                .transfer(market, side, self.address, seller, kept - merged)?;
        }
        if out > merged {
            self.ledger
                .transfer(market, counter, self.address, seller, out - merged)?;
        }
        ctx.record(RouterEvent::Fill {
            venue: ExecutionSource::Amm,
            side,
            direction: Direction::Sell,
            collateral: merged,
        });
        Ok(merged)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    pub(crate) fn update_twap_in(
        &self,
        store: &mut VaultStore,
        ctx: &mut OpContext,
        now: u64,
        market: MarketId,
    ) -> VaultResult<bool> {
        let book = store.get_mut(market)?;
        let timestamp = timestamp32(now)?;
        let (cumulative, _) = self
            .pool
            .cumulative_prices(market, timestamp)
            .ok_or_else(|| VaultError::illiquid(format!("no pool for market {market}")))?;
        let advanced = book.twap_mut().refresh(
            TwapObservation::new(timestamp, cumulative),
            self.config.min_twap_update_interval_secs,
        );
        ctx.record(RouterEvent::TwapUpdate(advanced));
        if advanced {
            info!(%market, twap_bps = ?book.twap().twap_bps(), "TWAP advanced");
        }
        Ok(advanced)
    }

    pub(crate) fn rebalance_in(
        &self,
        store: &mut VaultStore,
        ctx: &mut OpContext,
        now: u64,
        caller: Address,
        market: MarketId,
    ) -> VaultResult<u128> {
        require_address(&caller)?;
        let book = store.get_mut(market)?;
        let inventory = book.inventory();
        let Some(plan) = plan_rebalance(
            inventory.yes,
            inventory.no,
            self.config.vault.rebalance_bounty_bps,
        ) else {
            debug!(%market, "Nothing to rebalance");
            return Ok(0);
        };

        self.ledger
            .merge_pair(market, plan.merge, self.address, self.address)?;
        book.merge_inventory(plan.merge, timestamp32(now)?)?;
        if plan.bounty > 0 {
            self.ledger
                .transfer_collateral(self.address, caller, plan.bounty)?;
        }

        let (weight_yes, weight_no) = Self::distribution_weights(book);
        let split = split_by_weight(plan.distribute, weight_yes, weight_no)?;
        let outcome = self.distribute(book, ctx, split)?;
        ctx.record(RouterEvent::Rebalance {
            merged: plan.merge,
            bounty: plan.bounty,
        });
        record_state(ctx, book);

        info!(
            %market,
            caller = %caller,
            merged = plan.merge,
            bounty = plan.bounty,
            to_lps = outcome.to_lps(),
            to_budget = outcome.to_budget,
            "Vault rebalanced"
        );
        Ok(plan.merge)
    }

    pub(crate) fn settle_in(
        &self,
        store: &mut VaultStore,
        ctx: &mut OpContext,
        now: u64,
        market: MarketId,
    ) -> VaultResult<u128> {
        let book = store.get_mut(market)?;
        if !book.is_closed(now) {
            return Err(VaultError::Timing(TimingKind::NotClosed));
        }

        let inventory = book.inventory();
        let merge = inventory.yes.min(inventory.no);
        if merge > 0 {
            self.ledger
                .merge_pair(market, merge, self.address, self.address)?;
            book.merge_inventory(merge, timestamp32(now)?)?;
        }
        let budget = book.take_budget();
        let total = merge
            .checked_add(budget)
            .ok_or(VaultError::Overflow("settlement"))?;
        if total == 0 {
            return Ok(0);
        }

        let (weight_yes, weight_no) = Self::distribution_weights(book);
        let split = split_by_weight(total, weight_yes, weight_no)?;
        let outcome = self.distribute(book, ctx, split)?;
        ctx.record(RouterEvent::Settled(outcome.to_lps()));
        record_state(ctx, book);

        info!(
            %market,
            merged = merge,
            budget,
            to_lps = outcome.to_lps(),
            kept_in_budget = outcome.to_budget,
            "Rebalance budget settled"
        );
        Ok(outcome.to_lps())
    }
}
