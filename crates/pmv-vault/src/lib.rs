//! Vault inventory, LP positions and reward accounting.
//!
//! Components:
//! - `PackedVaultState`: YES/NO inventory and last activity in one 256-bit word
//! - `RewardAccumulator` / `RebalanceBudget`: per-share fee accounting
//! - `VaultPositionLedger`: per-provider vault shares and reward debts
//! - `MarketBook` / `VaultStore`: per-market state keyed by market id
//! - `rebalance`: merge sizing and notional-weighted distribution math

pub mod accumulator;
pub mod book;
pub mod config;
pub mod packed;
pub mod position;
pub mod rebalance;
pub mod store;

pub use accumulator::{FeeRouting, RebalanceBudget, RewardAccumulator};
pub use book::{Distribution, MarketBook, Withdrawal};
pub use config::VaultConfig;
pub use packed::{PackedVaultState, Sign, VaultInventory};
pub use position::{VaultPosition, VaultPositionLedger};
pub use rebalance::{plan_rebalance, split_by_weight, RebalancePlan, SideSplit};
pub use store::VaultStore;
