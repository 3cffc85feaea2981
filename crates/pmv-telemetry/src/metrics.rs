//! Prometheus metrics for the vault router.
//!
//! Covers:
//! - Fills and collateral volume per venue
//! - Spread income and where it was credited
//! - Rebalances, keeper bounties and settlements
//! - Oracle refreshes
//! - Rejected re-entry and failed operations
//! - Per-market inventory and budget gauges
//!
//! Amounts are collateral/share base units recorded as `f64`.
//!
//! # Panics
//!
//! Each `pmv_*` collector registers with the default registry the first
//! time it is touched. Registering a second collector under one of these
//! names in the same process panics at that point.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, Counter, CounterVec, Encoder,
    GaugeVec, TextEncoder,
};

/// Fills per venue.
/// Labels: venue (otc/mint/amm/vault), side (yes/no), direction (buy/sell)
pub static VENUE_FILLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmv_venue_fills_total",
        "Total fills routed to each venue",
        &["venue", "side", "direction"]
    )
    .unwrap()
});

/// Collateral routed through each venue.
pub static VENUE_COLLATERAL_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmv_venue_collateral_total",
        "Collateral units routed through each venue",
        &["venue", "direction"]
    )
    .unwrap()
});

/// OTC spread income by destination.
/// Labels: destination (lp_yes/lp_no/budget)
pub static SPREAD_FEES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmv_spread_fees_total",
        "OTC spread income by destination",
        &["destination"]
    )
    .unwrap()
});

/// LP fees redirected to the budget because the side had no providers.
pub static ORPHANED_FEES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmv_orphaned_fees_total",
        "Fees sent to the rebalance budget for lack of providers",
        &["side"]
    )
    .unwrap()
});

/// Rebalance merges executed.
pub static REBALANCES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("pmv_rebalances_total", "Total rebalance merges executed").unwrap()
});

/// Pairs merged by rebalances.
pub static REBALANCE_MERGED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "pmv_rebalance_merged_total",
        "Total YES/NO pairs merged by rebalances"
    )
    .unwrap()
});

/// Keeper bounties paid.
pub static REBALANCE_BOUNTY_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "pmv_rebalance_bounty_total",
        "Collateral paid to rebalance callers"
    )
    .unwrap()
});

/// Collateral distributed at settlement.
pub static SETTLED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "pmv_settled_collateral_total",
        "Collateral distributed to providers at settlement"
    )
    .unwrap()
});

/// TWAP refresh attempts.
/// Labels: result (advanced/skipped)
pub static TWAP_UPDATES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmv_twap_updates_total",
        "TWAP observation refresh attempts",
        &["result"]
    )
    .unwrap()
});

/// Re-entrant calls rejected by the guard.
pub static REENTRANCY_REJECTED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "pmv_reentrancy_rejected_total",
        "Re-entrant router calls rejected"
    )
    .unwrap()
});

/// Failed operations by error code.
pub static OPERATION_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmv_operation_errors_total",
        "Router operations that aborted",
        &["operation", "code"]
    )
    .unwrap()
});

/// Vault inventory per market and side.
pub static VAULT_INVENTORY: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pmv_vault_inventory",
        "Outcome shares held by the vault",
        &["market", "side"]
    )
    .unwrap()
});

/// Rebalance budget per market.
pub static REBALANCE_BUDGET: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pmv_rebalance_budget",
        "Collateral held in the rebalance budget",
        &["market"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    // =========================================================================
    // Routing
    // =========================================================================

    /// Record a venue fill and the collateral it moved.
    pub fn venue_fill(venue: &str, side: &str, direction: &str, collateral: u128) {
        VENUE_FILLS_TOTAL
            .with_label_values(&[venue, side, direction])
            .inc();
        VENUE_COLLATERAL_TOTAL
            .with_label_values(&[venue, direction])
            .inc_by(collateral as f64);
    }

    /// Record OTC spread income credited to `destination`.
    pub fn spread_fee(destination: &str, amount: u128) {
        if amount > 0 {
            SPREAD_FEES_TOTAL
                .with_label_values(&[destination])
                .inc_by(amount as f64);
        }
    }

    /// Record fees that had no providers to go to.
    pub fn orphaned_fee(side: &str, amount: u128) {
        if amount > 0 {
            ORPHANED_FEES_TOTAL
                .with_label_values(&[side])
                .inc_by(amount as f64);
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Record a rebalance merge.
    pub fn rebalance(merged: u128, bounty: u128) {
        REBALANCES_TOTAL.inc();
        REBALANCE_MERGED_TOTAL.inc_by(merged as f64);
        REBALANCE_BOUNTY_TOTAL.inc_by(bounty as f64);
    }

    /// Record collateral distributed at settlement.
    pub fn settled(amount: u128) {
        SETTLED_TOTAL.inc_by(amount as f64);
    }

    /// Record a TWAP refresh attempt.
    pub fn twap_update(advanced: bool) {
        let result = if advanced { "advanced" } else { "skipped" };
        TWAP_UPDATES_TOTAL.with_label_values(&[result]).inc();
    }

    // =========================================================================
    // Failures
    // =========================================================================

    /// Record a rejected re-entrant call.
    pub fn reentrancy_rejected() {
        REENTRANCY_REJECTED_TOTAL.inc();
    }

    /// Record an aborted operation.
    pub fn operation_error(operation: &str, code: &str) {
        OPERATION_ERRORS_TOTAL
            .with_label_values(&[operation, code])
            .inc();
    }

    // =========================================================================
    // Gauges
    // =========================================================================

    /// Update vault inventory and budget gauges for one market.
    pub fn vault_state(market: &str, yes: u128, no: u128, budget: u128) {
        VAULT_INVENTORY
            .with_label_values(&[market, "yes"])
            .set(yes as f64);
        VAULT_INVENTORY
            .with_label_values(&[market, "no"])
            .set(no as f64);
        REBALANCE_BUDGET
            .with_label_values(&[market])
            .set(budget as f64);
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Encode(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Encode(e.to_string()))
    }
}
