//! Simulator for the vault router.
//!
//! Builds a market on the in-memory ledger and pool, then replays:
//! - venue split per buy size (executed, not just quoted)
//! - stand-alone OTC vs AMM fills
//! - OTC spread by vault imbalance and by time to close

pub mod config;
pub mod error;
pub mod report;
pub mod scenario;

pub use config::SimConfig;
pub use error::{AppError, AppResult};
pub use report::{build_report, render_text, Report};
pub use scenario::SimWorld;
