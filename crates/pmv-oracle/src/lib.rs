//! Constant-product pricing and TWAP oracle for binary markets.
//!
//! Components:
//! - `amm`: swap output, price impact and merge sizing math
//! - `AmmPool`: the external pool seam (reserves, cumulative prices, swaps)
//! - `ConstantProductPool`: in-memory pool used by the simulator and tests
//! - `TwapOracle`: two-slot cumulative-price observation per market

pub mod amm;
pub mod pool;
pub mod twap;

pub use amm::{BuyQuote, PoolReserves, SellQuote};
pub use pool::{AmmPool, ConstantProductPool};
pub use twap::{probability_bps, TwapObservation, TwapOracle, MIN_UPDATE_INTERVAL_SECS};
