//! Core domain types for the prediction-market vault router.
//!
//! This crate provides the types shared by every other crate:
//! - `MarketId`, `Side`, `ExecutionSource`: identifiers and enums
//! - `VaultError`: the error taxonomy every entry point reports
//! - `math`: fixed-point helpers over `U256`
//! - `Clock`: injectable time source
//! - `OutcomeLedger`: the outcome-token ledger seam, plus an in-memory ledger

pub mod clock;
pub mod error;
pub mod ledger;
pub mod math;
pub mod memory;
pub mod types;

pub use alloy::primitives::{Address, U256};
pub use clock::{timestamp32, Clock, ManualClock, SystemClock};
pub use error::{TimingKind, VaultError, VaultResult};
pub use ledger::{OutcomeLedger, Savepoint, Transactional};
pub use memory::{InMemoryLedger, RecipientHook};
pub use types::{ExecutionSource, MarketId, Side};
