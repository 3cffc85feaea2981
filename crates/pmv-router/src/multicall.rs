//! Batched calls that succeed or fail together.

use alloy::primitives::Address;
use pmv_core::{MarketId, Side, VaultError, VaultResult};
use pmv_vault::Withdrawal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::router::{BuyOrder, Router, SellOrder, TradeOutcome};

/// One call inside a batch. The batch caller acts as provider, trader or keeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterCall {
    Deposit {
        market: MarketId,
        side: Side,
        shares: u128,
    },
    Withdraw {
        market: MarketId,
        side: Side,
        vault_shares: u128,
    },
    Harvest {
        market: MarketId,
        side: Side,
    },
    Buy(BuyOrder),
    Sell(SellOrder),
    UpdateTwap {
        market: MarketId,
    },
    Rebalance {
        market: MarketId,
    },
}

impl RouterCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "deposit",
            Self::Withdraw { .. } => "withdraw",
            Self::Harvest { .. } => "harvest",
            Self::Buy(_) => "buy",
            Self::Sell(_) => "sell",
            Self::UpdateTwap { .. } => "update_twap",
            Self::Rebalance { .. } => "rebalance",
        }
    }
}

/// Result of one batched call, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallResult {
    Deposited(u128),
    Withdrawn(Withdrawal),
    Harvested(u128),
    Traded(TradeOutcome),
    TwapUpdated(bool),
    Rebalanced(u128),
}

impl Router {
    /// Run `calls` in order under one guard and one rollback scope.
    ///
    /// The first failing call aborts the batch and undoes every earlier call.
    /// Refunds owed by the buys are paid once, after the last call.
    pub fn multicall(&self, caller: Address, calls: Vec<RouterCall>) -> VaultResult<Vec<CallResult>> {
        if calls.is_empty() {
            return Err(VaultError::invalid("empty batch"));
        }
        let now = self.now();
        let count = calls.len();
        let results = self.atomically("multicall", |store, ctx| {
            let mut results = Vec::with_capacity(count);
            for call in calls {
                let result = match call {
                    RouterCall::Deposit {
                        market,
                        side,
                        shares,
                    } => CallResult::Deposited(
                        self.deposit_in(store, ctx, now, caller, market, side, shares)?,
                    ),
                    RouterCall::Withdraw {
                        market,
                        side,
                        vault_shares,
                    } => CallResult::Withdrawn(
                        self.withdraw_in(store, ctx, now, caller, market, side, vault_shares)?,
                    ),
                    RouterCall::Harvest { market, side } => {
                        CallResult::Harvested(self.harvest_in(store, caller, market, side)?)
                    }
                    RouterCall::Buy(order) => {
                        CallResult::Traded(self.buy_in(store, ctx, now, caller, order)?)
                    }
                    RouterCall::Sell(order) => {
                        CallResult::Traded(self.sell_in(store, ctx, now, caller, order)?)
                    }
                    RouterCall::UpdateTwap { market } => {
                        CallResult::TwapUpdated(self.update_twap_in(store, ctx, now, market)?)
                    }
                    RouterCall::Rebalance { market } => {
                        CallResult::Rebalanced(self.rebalance_in(store, ctx, now, caller, market)?)
                    }
                };
                results.push(result);
            }
            Ok(results)
        })?;
        info!(caller = %caller, calls = count, "Multicall executed");
        Ok(results)
    }
}
