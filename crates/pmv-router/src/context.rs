//! Per-operation scratch state: pending refunds and metric events.
//!
//! Events are only published after the operation commits, so a rolled-back
//! operation never shows up in the counters.

use std::collections::BTreeMap;

use alloy::primitives::Address;
use pmv_core::{ExecutionSource, MarketId, Side, VaultError, VaultResult};
use pmv_telemetry::Metrics;

/// Something worth counting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    Fill {
        venue: ExecutionSource,
        side: Side,
        direction: Direction,
        collateral: u128,
    },
    SpreadFee {
        destination: &'static str,
        amount: u128,
    },
    OrphanedFee {
        side: Side,
        amount: u128,
    },
    Rebalance {
        merged: u128,
        bounty: u128,
    },
    Settled(u128),
    TwapUpdate(bool),
    VaultState {
        market: MarketId,
        yes: u128,
        no: u128,
        budget: u128,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// Refunds owed and events recorded while an operation runs.
#[derive(Debug, Default)]
pub struct OpContext {
    refunds: BTreeMap<Address, u128>,
    events: Vec<RouterEvent>,
}

impl OpContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Owe `amount` collateral back to `to`, paid once when the operation ends.
    pub fn add_refund(&mut self, to: Address, amount: u128) -> VaultResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let owed = self.refunds.entry(to).or_insert(0);
        *owed = owed
            .checked_add(amount)
            .ok_or(VaultError::Overflow("refund"))?;
        Ok(())
    }

    /// Drain pending refunds in address order.
    pub fn take_refunds(&mut self) -> Vec<(Address, u128)> {
        std::mem::take(&mut self.refunds).into_iter().collect()
    }

    pub fn record(&mut self, event: RouterEvent) {
        self.events.push(event);
    }

    #[must_use]
    pub fn events(&self) -> &[RouterEvent] {
        &self.events
    }

    /// Push every recorded event to Prometheus.
    pub fn publish(self) {
        for event in self.events {
            match event {
                RouterEvent::Fill {
                    venue,
                    side,
                    direction,
                    collateral,
                } => Metrics::venue_fill(venue.as_str(), side.as_str(), direction.as_str(), collateral),
                RouterEvent::SpreadFee {
                    destination,
                    amount,
                } => Metrics::spread_fee(destination, amount),
                RouterEvent::OrphanedFee { side, amount } => Metrics::orphaned_fee(side.as_str(), amount),
                RouterEvent::Rebalance { merged, bounty } => Metrics::rebalance(merged, bounty),
                RouterEvent::Settled(amount) => Metrics::settled(amount),
                RouterEvent::TwapUpdate(advanced) => Metrics::twap_update(advanced),
                RouterEvent::VaultState {
                    market,
                    yes,
                    no,
                    budget,
                } => Metrics::vault_state(&market.to_string(), yes, no, budget),
            }
        }
    }
}
