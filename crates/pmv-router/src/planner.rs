//! Venue selection.
//!
//! Pure functions from a [`RouteSnapshot`] to a fill plan. Nothing here
//! touches the store, the ledger or the pool; the router applies the plan
//! afterwards, so quoting and executing share one code path.
//!
//! Buy order: OTC, then mint, then AMM, with the remainder refunded. When
//! OTC and the AMM can each fill the whole order on their own, the AMM is
//! used only if it delivers strictly more shares.
//!
//! Sell order: OTC, then AMM, then deposit of the remainder into the vault.

use alloy::primitives::U256;
use pmv_core::math::{apply_bps, mul_div, mul_div_u128, mul_div_up_u128, to_u128, BPS, MAX_U112};
use pmv_core::{ExecutionSource, Side, VaultError, VaultResult};
use pmv_oracle::amm::{max_amount_under_impact, quote_buy, quote_sell};
use pmv_oracle::{BuyQuote, PoolReserves, SellQuote};
use pmv_vault::{split_by_weight, MarketBook, SideSplit, VaultInventory};
use serde::Serialize;

use crate::config::RouterConfig;
use crate::spread::{absolute_spread_bps, ask_bps, bid_bps, relative_spread_bps};

/// Everything the planner reads, captured at the start of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSnapshot {
    pub now: u64,
    pub close_time: u64,
    /// Time-weighted P(YES), `None` until the oracle has two observations.
    pub twap_bps: Option<u32>,
    pub reserves: Option<PoolReserves>,
    pub fee_bps: u32,
    pub inventory: VaultInventory,
    pub total_yes_shares: u128,
    pub total_no_shares: u128,
}

impl RouteSnapshot {
    #[must_use]
    pub fn from_book(book: &MarketBook, reserves: Option<PoolReserves>, fee_bps: u32, now: u64) -> Self {
        Self {
            now,
            close_time: book.close_time(),
            twap_bps: book.twap().twap_bps(),
            reserves,
            fee_bps,
            inventory: book.inventory(),
            total_yes_shares: book.total_shares(Side::Yes),
            total_no_shares: book.total_shares(Side::No),
        }
    }

    /// Live pool P(YES).
    #[must_use]
    pub fn spot_bps(&self) -> Option<u32> {
        self.reserves.and_then(|r| r.spot_yes_bps())
    }

    #[must_use]
    pub fn secs_to_close(&self) -> u64 {
        self.close_time.saturating_sub(self.now)
    }

    #[must_use]
    pub fn in_close_window(&self, window_secs: u64) -> bool {
        self.now.saturating_add(window_secs) >= self.close_time
    }

    #[must_use]
    pub fn total_shares(&self, side: Side) -> u128 {
        match side {
            Side::Yes => self.total_yes_shares,
            Side::No => self.total_no_shares,
        }
    }

    /// TWAP to price OTC fills at, or `None` when OTC is disabled: no TWAP,
    /// no live spot, spot too far from TWAP, or inside the close window.
    #[must_use]
    pub fn otc_price(&self, config: &RouterConfig) -> Option<u32> {
        if self.in_close_window(config.close_window_secs) {
            return None;
        }
        let twap = self.twap_bps?;
        let spot = self.spot_bps()?;
        (spot.abs_diff(twap) <= config.max_twap_deviation_bps).then_some(twap)
    }

    fn with_inventory(self, side: Side, amount: u128) -> Self {
        let mut next = self;
        match side {
            Side::Yes => next.inventory.yes = amount,
            Side::No => next.inventory.no = amount,
        }
        next
    }
}

// ============================================================================
// Fills
// ============================================================================

/// Spread income divided between LPs and the rebalance budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SpreadIncome {
    pub total: u128,
    /// LP part, weighted toward the scarcer side.
    pub to_yes: u128,
    pub to_no: u128,
    pub to_budget: u128,
}

impl SpreadIncome {
    #[must_use]
    pub fn lp_split(&self) -> SideSplit {
        SideSplit {
            yes: self.to_yes,
            no: self.to_no,
        }
    }
}

/// OTC fill of a buy from vault inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OtcBuyFill {
    pub shares: u128,
    pub collateral: u128,
    /// TWAP price of the bought side.
    pub price_bps: u32,
    pub ask_bps: u32,
    /// Credited to LPs of the side that sold.
    pub principal: u128,
    pub spread: SpreadIncome,
}

/// Fresh pairs minted for a buy; the opposite side goes into the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MintFill {
    pub collateral: u128,
    pub vault_shares: u128,
}

/// OTC fill of a sell against the vault's opposite-side inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OtcSellFill {
    /// Seller shares paired with vault inventory and merged.
    pub shares: u128,
    pub proceeds: u128,
    pub price_bps: u32,
    pub bid_bps: u32,
    /// Credited to LPs of the counter side.
    pub principal: u128,
    pub spread: SpreadIncome,
}

/// Pool sale of part of a sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmmSellFill {
    pub shares_in: u128,
    pub quote: SellQuote,
}

/// Unsold shares parked in the vault for the seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VaultDeposit {
    pub shares: u128,
    pub vault_shares: u128,
}

/// How a buy is split across venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuyPlan {
    pub side: Side,
    pub collateral_in: u128,
    pub otc: Option<OtcBuyFill>,
    pub mint: Option<MintFill>,
    pub amm: Option<BuyQuote>,
    pub shares_out: u128,
    /// Collateral returned to the buyer.
    pub refund: u128,
}

impl BuyPlan {
    /// Venue tag, `None` when nothing fills.
    #[must_use]
    pub fn source(&self) -> Option<ExecutionSource> {
        let mut venues = Vec::with_capacity(3);
        if self.otc.is_some() {
            venues.push(ExecutionSource::Otc);
        }
        if self.mint.is_some() {
            venues.push(ExecutionSource::Mint);
        }
        if self.amm.is_some() {
            venues.push(ExecutionSource::Amm);
        }
        ExecutionSource::from_venues(&venues)
    }

    #[must_use]
    pub fn vault_shares_minted(&self) -> u128 {
        self.mint.map_or(0, |m| m.vault_shares)
    }
}

/// How a sell is split across venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellPlan {
    pub side: Side,
    pub shares_in: u128,
    pub otc: Option<OtcSellFill>,
    pub amm: Option<AmmSellFill>,
    pub deposit: Option<VaultDeposit>,
    /// Shares handed back untouched.
    pub returned: u128,
    pub collateral_out: u128,
}

impl SellPlan {
    #[must_use]
    pub fn source(&self) -> Option<ExecutionSource> {
        let mut venues = Vec::with_capacity(3);
        if self.otc.is_some() {
            venues.push(ExecutionSource::Otc);
        }
        if self.amm.is_some() {
            venues.push(ExecutionSource::Amm);
        }
        if self.deposit.is_some() {
            venues.push(ExecutionSource::Vault);
        }
        ExecutionSource::from_venues(&venues)
    }

    #[must_use]
    pub fn vault_shares_minted(&self) -> u128 {
        self.deposit.map_or(0, |d| d.vault_shares)
    }
}

// ============================================================================
// Planning
// ============================================================================

fn overflow(what: &'static str) -> VaultError {
    VaultError::Overflow(what)
}

/// Largest OTC fill against `available` inventory: a fixed percentage,
/// but at least one share while any inventory exists.
#[must_use]
pub fn vault_fill_cap(available: u128, max_fill_pct: u32) -> u128 {
    if available == 0 {
        return 0;
    }
    (available / 100)
        .saturating_mul(u128::from(max_fill_pct))
        .saturating_add(available % 100 * u128::from(max_fill_pct) / 100)
        .max(1)
}

/// Split OTC spread income. The LP part is weighted by the opposite side's
/// TWAP notional after the fill, so the scarcer side earns more.
pub fn split_spread(
    config: &RouterConfig,
    spread: u128,
    inventory_after: VaultInventory,
    p_yes_bps: u32,
) -> VaultResult<SpreadIncome> {
    let lp = apply_bps(spread, config.otc_spread_lp_share_bps.min(BPS))
        .ok_or_else(|| overflow("spread lp share"))?;
    let weight_yes = U256::from(inventory_after.no) * U256::from(Side::No.price_bps(p_yes_bps));
    let weight_no = U256::from(inventory_after.yes) * U256::from(Side::Yes.price_bps(p_yes_bps));
    let split = split_by_weight(lp, weight_yes, weight_no)?;
    Ok(SpreadIncome {
        total: spread,
        to_yes: split.yes,
        to_no: split.no,
        to_budget: spread - lp,
    })
}

/// OTC leg of a buy of `side` with `collateral`.
pub fn plan_otc_buy(
    config: &RouterConfig,
    snapshot: &RouteSnapshot,
    side: Side,
    collateral: u128,
) -> VaultResult<Option<OtcBuyFill>> {
    let Some(p_yes) = snapshot.otc_price(config) else {
        return Ok(None);
    };
    let available = snapshot.inventory.of(side);
    if available == 0 || collateral == 0 {
        return Ok(None);
    }
    let price = side.price_bps(p_yes);
    let relative = relative_spread_bps(
        config,
        available,
        snapshot.inventory.of(side.opposite()),
        snapshot.secs_to_close(),
    );
    let ask = ask_bps(price, absolute_spread_bps(config, price, relative));

    let raw = mul_div_u128(collateral, u128::from(BPS), u128::from(ask))
        .ok_or_else(|| overflow("otc shares"))?;
    let shares = raw
        .min(vault_fill_cap(available, config.max_vault_fill_pct))
        .min(available);
    if shares == 0 {
        return Ok(None);
    }
    let used = if shares == raw {
        collateral
    } else {
        mul_div_up_u128(shares, u128::from(ask), u128::from(BPS))
            .ok_or_else(|| overflow("otc cost"))?
            .min(collateral)
    };
    let principal = mul_div_u128(shares, u128::from(price), u128::from(BPS))
        .ok_or_else(|| overflow("otc principal"))?;
    let after = snapshot.with_inventory(side, available - shares).inventory;
    let spread = split_spread(config, used.saturating_sub(principal), after, p_yes)?;

    Ok(Some(OtcBuyFill {
        shares,
        collateral: used,
        price_bps: price,
        ask_bps: ask,
        principal,
        spread,
    }))
}

/// Mint leg of a buy. The opposite side joins the vault only while it is
/// the scarce (or tied) side in TWAP notional, and only up to the
/// configured notional ratio.
pub fn plan_mint(
    config: &RouterConfig,
    snapshot: &RouteSnapshot,
    side: Side,
    collateral: u128,
) -> VaultResult<Option<MintFill>> {
    if collateral == 0 || snapshot.in_close_window(config.close_window_secs) {
        return Ok(None);
    }
    let Some(p_yes) = snapshot.twap_bps else {
        return Ok(None);
    };
    let counter = side.opposite();
    let p_side = U256::from(side.price_bps(p_yes));
    let p_counter = side.opposite().price_bps(p_yes);
    let side_inventory = snapshot.inventory.of(side);
    let counter_inventory = snapshot.inventory.of(counter);

    let notional_side = U256::from(side_inventory) * p_side;
    let notional_counter = U256::from(counter_inventory) * U256::from(p_counter);
    if notional_side.is_zero() || notional_counter > notional_side || p_counter == 0 {
        return Ok(None);
    }

    let target = mul_div(
        notional_side,
        U256::from(config.max_imbalance_ratio_bps),
        U256::from(BPS) * U256::from(p_counter),
    )
    .ok_or_else(|| overflow("mint target"))?;
    let target = to_u128(target).unwrap_or(MAX_U112).min(MAX_U112);
    let amount = collateral.min(target.saturating_sub(counter_inventory));
    if amount == 0 {
        return Ok(None);
    }

    let Some(vault_shares) = vault_shares_for(snapshot, counter, amount)? else {
        return Ok(None);
    };
    Ok(Some(MintFill {
        collateral: amount,
        vault_shares,
    }))
}

/// Vault shares a deposit of `amount` on `side` would mint, `None` when the
/// deposit would be rejected.
fn vault_shares_for(snapshot: &RouteSnapshot, side: Side, amount: u128) -> VaultResult<Option<u128>> {
    let total = snapshot.total_shares(side);
    let inventory = snapshot.inventory.of(side);
    if inventory.saturating_add(amount) > MAX_U112 {
        return Ok(None);
    }
    if total == 0 || inventory == 0 {
        return Ok(Some(amount));
    }
    let minted = mul_div_u128(amount, total, inventory).ok_or_else(|| overflow("vault shares"))?;
    Ok((minted > 0 && total.saturating_add(minted) <= MAX_U112).then_some(minted))
}

/// Largest pool buy under the impact cap.
#[must_use]
pub fn plan_amm_buy(config: &RouterConfig, snapshot: &RouteSnapshot, side: Side, collateral: u128) -> Option<BuyQuote> {
    let reserves = snapshot.reserves?;
    let fee = snapshot.fee_bps;
    let amount = max_amount_under_impact(collateral, config.max_price_impact_bps, |c| {
        quote_buy(reserves, side, c, fee).map(|q| q.impact_bps)
    });
    if amount == 0 {
        return None;
    }
    quote_buy(reserves, side, amount, fee).filter(|q| q.shares_out > 0)
}

/// Split a buy of `side` for `collateral` across venues.
pub fn plan_buy(config: &RouterConfig, snapshot: &RouteSnapshot, side: Side, collateral: u128) -> VaultResult<BuyPlan> {
    let otc = plan_otc_buy(config, snapshot, side, collateral)?;
    let mut plan = BuyPlan {
        side,
        collateral_in: collateral,
        otc: None,
        mint: None,
        amm: None,
        shares_out: 0,
        refund: collateral,
    };

    let otc_fills_all = otc.filter(|o| o.collateral == collateral);
    let amm_fills_all = plan_amm_buy(config, snapshot, side, collateral)
        .filter(|q| q.collateral_in == collateral);
    if let (Some(otc), Some(amm)) = (otc_fills_all, amm_fills_all) {
        if amm.shares_out > otc.shares {
            plan.amm = Some(amm);
            plan.shares_out = amm.shares_out;
        } else {
            plan.otc = Some(otc);
            plan.shares_out = otc.shares;
        }
        plan.refund = 0;
        return Ok(plan);
    }

    let mut remaining = collateral;
    let mut after_otc = *snapshot;
    if let Some(fill) = otc {
        remaining -= fill.collateral;
        plan.shares_out += fill.shares;
        after_otc = snapshot.with_inventory(side, snapshot.inventory.of(side) - fill.shares);
        plan.otc = Some(fill);
    }

    if let Some(mint) = plan_mint(config, &after_otc, side, remaining)? {
        remaining -= mint.collateral;
        plan.shares_out += mint.collateral;
        plan.mint = Some(mint);
    }

    if let Some(amm) = plan_amm_buy(config, snapshot, side, remaining) {
        remaining -= amm.collateral_in;
        plan.shares_out = plan
            .shares_out
            .checked_add(amm.shares_out)
            .ok_or_else(|| overflow("shares out"))?;
        plan.amm = Some(amm);
    }

    plan.refund = remaining;
    Ok(plan)
}

/// OTC leg of a sell of `shares` of `side`.
pub fn plan_otc_sell(
    config: &RouterConfig,
    snapshot: &RouteSnapshot,
    side: Side,
    shares: u128,
) -> VaultResult<Option<OtcSellFill>> {
    let Some(p_yes) = snapshot.otc_price(config) else {
        return Ok(None);
    };
    let counter = side.opposite();
    let available = snapshot.inventory.of(counter);
    if available == 0 || shares == 0 {
        return Ok(None);
    }
    let price = side.price_bps(p_yes);
    let relative = relative_spread_bps(
        config,
        available,
        snapshot.inventory.of(side),
        snapshot.secs_to_close(),
    );
    let bid = bid_bps(price, absolute_spread_bps(config, price, relative));
    if bid == 0 {
        return Ok(None);
    }

    let filled = shares
        .min(vault_fill_cap(available, config.max_vault_fill_pct))
        .min(available);
    let proceeds = mul_div_u128(filled, u128::from(bid), u128::from(BPS))
        .ok_or_else(|| overflow("otc proceeds"))?;
    let principal = mul_div_u128(filled, u128::from(counter.price_bps(p_yes)), u128::from(BPS))
        .ok_or_else(|| overflow("otc principal"))?;
    let after = snapshot.with_inventory(counter, available - filled).inventory;
    let spread_total = filled.saturating_sub(proceeds).saturating_sub(principal);
    let spread = split_spread(config, spread_total, after, p_yes)?;

    Ok(Some(OtcSellFill {
        shares: filled,
        proceeds,
        price_bps: price,
        bid_bps: bid,
        principal,
        spread,
    }))
}

/// Largest pool sale under the impact cap.
#[must_use]
pub fn plan_amm_sell(config: &RouterConfig, snapshot: &RouteSnapshot, side: Side, shares: u128) -> Option<AmmSellFill> {
    let reserves = snapshot.reserves?;
    let fee = snapshot.fee_bps;
    let amount = max_amount_under_impact(shares, config.max_price_impact_bps, |s| {
        quote_sell(reserves, side, s, fee).map(|q| q.impact_bps)
    });
    if amount == 0 {
        return None;
    }
    quote_sell(reserves, side, amount, fee)
        .filter(|q| q.collateral_out > 0)
        .map(|quote| AmmSellFill {
            shares_in: amount,
            quote,
        })
}

/// Split a sell of `shares` of `side` across venues.
pub fn plan_sell(config: &RouterConfig, snapshot: &RouteSnapshot, side: Side, shares: u128) -> VaultResult<SellPlan> {
    let otc = plan_otc_sell(config, snapshot, side, shares)?;
    let mut plan = SellPlan {
        side,
        shares_in: shares,
        otc: None,
        amm: None,
        deposit: None,
        returned: 0,
        collateral_out: 0,
    };

    let otc_fills_all = otc.filter(|o| o.shares == shares);
    let amm_fills_all = plan_amm_sell(config, snapshot, side, shares).filter(|a| a.shares_in == shares);
    if let (Some(otc), Some(amm)) = (otc_fills_all, amm_fills_all) {
        if amm.quote.collateral_out > otc.proceeds {
            plan.collateral_out = amm.quote.collateral_out;
            plan.amm = Some(amm);
        } else {
            plan.collateral_out = otc.proceeds;
            plan.otc = Some(otc);
        }
        return Ok(plan);
    }

    let mut remaining = shares;
    if let Some(fill) = otc {
        remaining -= fill.shares;
        plan.collateral_out += fill.proceeds;
        plan.otc = Some(fill);
    }

    if let Some(fill) = plan_amm_sell(config, snapshot, side, remaining) {
        remaining -= fill.shares_in;
        plan.collateral_out = plan
            .collateral_out
            .checked_add(fill.quote.collateral_out)
            .ok_or_else(|| overflow("collateral out"))?;
        plan.amm = Some(fill);
    }

    if remaining > 0 && !snapshot.in_close_window(config.close_window_secs) {
        if let Some(vault_shares) = vault_shares_for(snapshot, side, remaining)? {
            plan.deposit = Some(VaultDeposit {
                shares: remaining,
                vault_shares,
            });
            remaining = 0;
        }
    }

    plan.returned = remaining;
    Ok(plan)
}
