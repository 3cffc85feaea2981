//! Sizing and spread tables.

use std::fmt::Write as _;

use pmv_core::math::BPS;
use pmv_core::Side;
use pmv_router::planner::{plan_amm_buy, plan_otc_buy};
use pmv_router::spread::{absolute_spread_bps, ask_bps, bid_bps, relative_spread_bps};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::config::SimConfig;
use crate::error::AppResult;
use crate::scenario::SimWorld;

/// Prices are reported at this P(YES) in the spread tables.
const REFERENCE_PRICE_BPS: u32 = 5_000;

/// How one buy size was split across venues, as executed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueSplitRow {
    pub size: u64,
    pub source: String,
    pub otc_shares: u128,
    pub mint_shares: u128,
    pub amm_shares: u128,
    pub refund: u128,
    pub shares_out: u128,
    pub vault_shares_minted: u128,
    /// Collateral spent per share delivered.
    pub effective_price: Option<Decimal>,
}

/// Stand-alone OTC and AMM fills for the same size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OtcVsAmmRow {
    pub size: u64,
    pub otc_shares: u128,
    pub otc_price: Option<Decimal>,
    pub amm_shares: u128,
    pub amm_price: Option<Decimal>,
    /// Venue that would take the whole order, `split` when neither can.
    pub winner: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpreadRow {
    /// Larger side's share of the vault (bps), or hours to close.
    pub input: u64,
    pub relative_bps: u32,
    pub absolute_bps: u32,
    pub ask_bps: u32,
    pub bid_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub twap_probability: Option<Decimal>,
    pub pool_depth: u64,
    pub vault_yes: u64,
    pub vault_no: u64,
    pub venue_split: Vec<VenueSplitRow>,
    pub otc_vs_amm: Vec<OtcVsAmmRow>,
    pub spread_by_imbalance: Vec<SpreadRow>,
    pub spread_by_time: Vec<SpreadRow>,
}

/// Convert base units to a decimal amount of collateral.
#[must_use]
pub fn to_units(amount: u128, unit: u64) -> Option<Decimal> {
    let raw = i128::try_from(amount).ok()?;
    Decimal::try_from_i128_with_scale(raw, unit.checked_ilog10()?).ok()
}

/// Probability in bps as a fraction.
#[must_use]
pub fn probability(bps: u32) -> Decimal {
    Decimal::new(i64::from(bps), 4)
}

fn price(collateral: u128, shares: u128) -> Option<Decimal> {
    if shares == 0 {
        return None;
    }
    let collateral = to_units(collateral, 1)?;
    let shares = to_units(shares, 1)?;
    collateral.checked_div(shares).map(|p| p.round_dp(6))
}

/// Build every table. Each venue-split row runs on a fresh market.
pub fn build_report(config: &SimConfig) -> AppResult<Report> {
    let baseline = SimWorld::new(config)?;
    let snapshot = baseline.snapshot()?;

    let mut venue_split = Vec::with_capacity(config.trade_sizes.len());
    let mut otc_vs_amm = Vec::with_capacity(config.trade_sizes.len());
    for &size in &config.trade_sizes {
        let collateral = config.scaled(size);

        let world = SimWorld::new(config)?;
        let (plan, outcome) = world.buy(Side::Yes, collateral)?;
        venue_split.push(VenueSplitRow {
            size,
            source: outcome.source.to_string(),
            otc_shares: plan.otc.map_or(0, |o| o.shares),
            mint_shares: plan.mint.map_or(0, |m| m.collateral),
            amm_shares: plan.amm.map_or(0, |a| a.shares_out),
            refund: plan.refund,
            shares_out: outcome.amount_out,
            vault_shares_minted: outcome.vault_shares_minted,
            effective_price: price(collateral - plan.refund, outcome.amount_out),
        });

        let otc = plan_otc_buy(&config.router, &snapshot, Side::Yes, collateral)?;
        let amm = plan_amm_buy(&config.router, &snapshot, Side::Yes, collateral);
        let otc_full = otc.filter(|o| o.collateral == collateral);
        let amm_full = amm.filter(|a| a.collateral_in == collateral);
        let winner = match (otc_full, amm_full) {
            (Some(o), Some(a)) if a.shares_out > o.shares => "amm",
            (Some(_), _) => "otc",
            (None, Some(_)) => "amm",
            (None, None) => "split",
        };
        otc_vs_amm.push(OtcVsAmmRow {
            size,
            otc_shares: otc.map_or(0, |o| o.shares),
            otc_price: otc.and_then(|o| price(o.collateral, o.shares)),
            amm_shares: amm.map_or(0, |a| a.shares_out),
            amm_price: amm.and_then(|a| price(a.collateral_in, a.shares_out)),
            winner,
        });
    }

    let far = config.days_to_close * 86_400;
    let spread_by_imbalance = config
        .imbalances_bps
        .iter()
        .map(|&imbalance| {
            // The order consumes the scarce side
            let consumed = u128::from(BPS - imbalance);
            spread_row(config, u64::from(imbalance), consumed, u128::from(imbalance), far)
        })
        .collect();
    let spread_by_time = config
        .hours_to_close
        .iter()
        .map(|&hours| spread_row(config, hours, 1, 1, hours * 3_600))
        .collect();

    let report = Report {
        twap_probability: snapshot.twap_bps.map(probability),
        pool_depth: config.pool_depth,
        vault_yes: config.vault_yes,
        vault_no: config.vault_no,
        venue_split,
        otc_vs_amm,
        spread_by_imbalance,
        spread_by_time,
    };
    info!(
        sizes = report.venue_split.len(),
        imbalances = report.spread_by_imbalance.len(),
        "Simulation report built"
    );
    Ok(report)
}

fn spread_row(config: &SimConfig, input: u64, consumed: u128, other: u128, secs_to_close: u64) -> SpreadRow {
    let relative = relative_spread_bps(&config.router, consumed, other, secs_to_close);
    let absolute = absolute_spread_bps(&config.router, REFERENCE_PRICE_BPS, relative);
    SpreadRow {
        input,
        relative_bps: relative,
        absolute_bps: absolute,
        ask_bps: ask_bps(REFERENCE_PRICE_BPS, absolute),
        bid_bps: bid_bps(REFERENCE_PRICE_BPS, absolute),
    }
}

fn decimal_cell(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Plain-text rendering of the report.
#[must_use]
pub fn render_text(report: &Report, unit: u64) -> String {
    let units = |amount: u128| decimal_cell(to_units(amount, unit));
    let mut out = String::new();

    let _ = writeln!(
        out,
        "pool depth {} | vault {} YES / {} NO | TWAP P(YES) {}",
        report.pool_depth,
        report.vault_yes,
        report.vault_no,
        decimal_cell(report.twap_probability)
    );

    let _ = writeln!(out, "\n== Venue split (buy YES) ==");
    let _ = writeln!(
        out,
        "{:>8} {:>6} {:>12} {:>12} {:>12} {:>12} {:>12} {:>10}",
        "size", "source", "otc", "mint", "amm", "refund", "shares", "price"
    );
    for row in &report.venue_split {
        let _ = writeln!(
            out,
            "{:>8} {:>6} {:>12} {:>12} {:>12} {:>12} {:>12} {:>10}",
            row.size,
            row.source,
            units(row.otc_shares),
            units(row.mint_shares),
            units(row.amm_shares),
            units(row.refund),
            units(row.shares_out),
            decimal_cell(row.effective_price)
        );
    }

    let _ = writeln!(out, "\n== OTC vs AMM ==");
    let _ = writeln!(
        out,
        "{:>8} {:>12} {:>10} {:>12} {:>10} {:>7}",
        "size", "otc", "otc px", "amm", "amm px", "winner"
    );
    for row in &report.otc_vs_amm {
        let _ = writeln!(
            out,
            "{:>8} {:>12} {:>10} {:>12} {:>10} {:>7}",
            row.size,
            units(row.otc_shares),
            decimal_cell(row.otc_price),
            units(row.amm_shares),
            decimal_cell(row.amm_price),
            row.winner
        );
    }

    for (title, label, rows) in [
        ("Spread by imbalance", "imb bps", &report.spread_by_imbalance),
        ("Spread by time to close", "hours", &report.spread_by_time),
    ] {
        let _ = writeln!(out, "\n== {title} ==");
        let _ = writeln!(
            out,
            "{:>8} {:>9} {:>9} {:>6} {:>6}",
            label, "relative", "absolute", "ask", "bid"
        );
        for row in rows {
            let _ = writeln!(
                out,
                "{:>8} {:>9} {:>9} {:>6} {:>6}",
                row.input, row.relative_bps, row.absolute_bps, row.ask_bps, row.bid_bps
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_units_and_probability() {
        assert_eq!(to_units(1_500_000, 1_000_000), Some(dec!(1.5)));
        assert_eq!(to_units(7, 1), Some(dec!(7)));
        assert_eq!(probability(6_250), dec!(0.625));
    }

    #[test]
    fn test_price_rounds_to_six_places() {
        assert_eq!(price(15_150_000, 30_000_000), Some(dec!(0.505)));
        assert_eq!(price(1, 3), Some(dec!(0.333333)));
        assert_eq!(price(1, 0), None);
    }

    #[test]
    fn test_spread_rows_follow_the_curves() {
        let config = SimConfig::default();
        let balanced = spread_row(&config, 5_000, 5_000, 5_000, 30 * 86_400);
        assert_eq!(balanced.relative_bps, 100);
        assert_eq!(balanced.absolute_bps, 50);
        assert_eq!(balanced.ask_bps, 5_050);
        assert_eq!(balanced.bid_bps, 4_950);

        // Fully one-sided and at close: 100 + 400 + 200 capped at 500
        let worst = spread_row(&config, 10_000, 0, 10_000, 0);
        assert_eq!(worst.relative_bps, 500);
        assert_eq!(worst.absolute_bps, 250);
    }

    #[test]
    fn test_report_covers_every_grid_point() {
        let config = SimConfig::default();
        let report = build_report(&config).unwrap();
        assert_eq!(report.twap_probability, Some(dec!(0.5)));
        assert_eq!(report.venue_split.len(), config.trade_sizes.len());
        assert_eq!(report.otc_vs_amm.len(), config.trade_sizes.len());
        assert_eq!(report.spread_by_imbalance.len(), config.imbalances_bps.len());
        assert_eq!(report.spread_by_time.len(), config.hours_to_close.len());

        // Deep pool beats a capped OTC fill on the smallest size
        assert_eq!(report.otc_vs_amm[0].winner, "amm");
        for row in &report.venue_split {
            assert!(row.shares_out > 0);
        }

        let text = render_text(&report, config.unit);
        assert!(text.contains("== Venue split (buy YES) =="));
        assert!(text.contains("Spread by time to close"));
    }
}
