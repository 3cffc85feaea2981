//! Integration tests for pmv-router.
//!
//! These tests drive the router against the in-memory ledger and pool:
//! - Venue routing and fee accounting
//! - LP deposits, withdrawals and settlement
//! - Atomicity, reentrancy and batching

pub mod harness;
