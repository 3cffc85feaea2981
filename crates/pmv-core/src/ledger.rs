//! Outcome-token ledger seam.
//!
//! The router never owns token balances. It calls into the ledger to mint,
//! merge and move YES/NO shares and collateral, and relies on savepoints to
//! undo those calls when an operation aborts.

use crate::error::VaultResult;
use crate::types::{MarketId, Side};
use alloy::primitives::Address;

/// Opaque savepoint handle returned by [`Transactional::savepoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint(pub usize);

/// Collaborators whose side effects must roll back with the operation.
pub trait Transactional: Send + Sync {
    /// Record the current state.
    fn savepoint(&self) -> Savepoint;

    /// Restore the state recorded at `savepoint` and discard it.
    fn rollback(&self, savepoint: Savepoint);

    /// Keep the current state and discard `savepoint`.
    fn release(&self, savepoint: Savepoint);
}

/// Outcome-token and collateral ledger.
pub trait OutcomeLedger: Transactional {
    /// Lock `amount` collateral from `payer` and credit `to` with `amount` YES and NO.
    fn mint_pair(&self, market: MarketId, amount: u128, payer: Address, to: Address)
        -> VaultResult<()>;

    /// Burn `amount` YES and NO from `from` and release `amount` collateral to `to`.
    fn merge_pair(&self, market: MarketId, amount: u128, from: Address, to: Address)
        -> VaultResult<()>;

    /// Move outcome shares of one side.
    fn transfer(
        &self,
        market: MarketId,
        side: Side,
        from: Address,
        to: Address,
        amount: u128,
    ) -> VaultResult<()>;

    /// Move collateral.
    fn transfer_collateral(&self, from: Address, to: Address, amount: u128) -> VaultResult<()>;

    /// Return excess collateral to `to`, forwarding at most `stipend` units
    /// of execution budget to the recipient's receive hook.
    ///
    /// A rejected or failed receipt is an error, never a silent loss.
    fn send_refund(&self, from: Address, to: Address, amount: u128, stipend: u64)
        -> VaultResult<()>;

    fn balance_of(&self, market: MarketId, side: Side, owner: Address) -> u128;

    fn collateral_of(&self, owner: Address) -> u128;
}
