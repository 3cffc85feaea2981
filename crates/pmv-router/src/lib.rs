//! Best-execution router for binary YES/NO markets.
//!
//! The router owns one vault per market and routes each trade across three
//! venues:
//! - OTC fills against vault inventory, priced off the TWAP plus a dynamic spread
//! - minting fresh pairs, with the unwanted side deposited into the vault
//! - the external constant-product pool, capped by price impact
//!
//! Components:
//! - `RouterConfig`: tunables, loaded from TOML
//! - `planner`: pure venue selection shared by quotes and execution
//! - `spread`: relative and absolute spread curves
//! - `Router`: entry points, all-or-nothing under one reentrancy guard
//! - `multicall`: batches that commit or roll back together

pub mod config;
pub mod context;
pub mod guard;
pub mod multicall;
mod ops;
pub mod planner;
pub mod router;
pub mod spread;

pub use config::RouterConfig;
pub use context::{Direction, OpContext, RouterEvent};
pub use guard::{GuardToken, ReentrancyGuard};
pub use multicall::{CallResult, RouterCall};
pub use planner::{BuyPlan, RouteSnapshot, SellPlan, SpreadIncome};
pub use router::{BuyOrder, Router, SellOrder, TradeOutcome};
