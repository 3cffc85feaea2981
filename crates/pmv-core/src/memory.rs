//! In-memory outcome ledger.
//!
//! Used by the simulator and the test suites. Recipients may register a
//! receive hook that runs on refunds, which is how tests model a recipient
//! that calls back into the router.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use alloy::primitives::Address;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{VaultError, VaultResult};
use crate::ledger::{OutcomeLedger, Savepoint, Transactional};
use crate::types::{MarketId, Side};

/// Receive hook: `(recipient, amount, stipend) -> accepted`.
pub type RecipientHook = Arc<dyn Fn(Address, u128, u64) -> bool + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    shares: HashMap<(MarketId, Side, Address), u128>,
    collateral: HashMap<Address, u128>,
    /// Collateral locked behind minted pairs, per market.
    locked: HashMap<MarketId, u128>,
}

fn debit<K: Eq + Hash>(map: &mut HashMap<K, u128>, key: K, amount: u128) -> VaultResult<()> {
    let balance = map.get(&key).copied().unwrap_or(0);
    let remaining = balance.checked_sub(amount).ok_or_else(|| {
        VaultError::TransferFailed(format!("balance {} below {}", balance, amount))
    })?;
    if remaining == 0 {
        map.remove(&key);
    } else {
        map.insert(key, remaining);
    }
    Ok(())
}

fn credit<K: Eq + Hash>(map: &mut HashMap<K, u128>, key: K, amount: u128) -> VaultResult<()> {
    if amount == 0 {
        return Ok(());
    }
    let entry = map.entry(key).or_insert(0);
    *entry = entry
        .checked_add(amount)
        .ok_or(VaultError::Overflow("ledger balance"))?;
    Ok(())
}

/// Ledger backed by hash maps behind a mutex.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    savepoints: Mutex<Vec<LedgerState>>,
    hooks: RwLock<HashMap<Address, RecipientHook>>,
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLedger")
            .field("state", &*self.state.lock())
            .field("savepoints", &self.savepoints.lock().len())
            .finish()
    }
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit collateral out of thin air (test and simulation funding).
    pub fn fund_collateral(&self, owner: Address, amount: u128) -> VaultResult<()> {
        credit(&mut self.state.lock().collateral, owner, amount)
    }

    /// Register a hook that runs whenever `recipient` receives a refund.
    pub fn set_recipient_hook(&self, recipient: Address, hook: RecipientHook) {
        self.hooks.write().insert(recipient, hook);
    }

    pub fn clear_recipient_hook(&self, recipient: Address) {
        self.hooks.write().remove(&recipient);
    }

    /// Collateral locked behind outstanding pairs of `market`.
    #[must_use]
    pub fn locked_collateral(&self, market: MarketId) -> u128 {
        self.state.lock().locked.get(&market).copied().unwrap_or(0)
    }

    /// Outstanding savepoints (zero outside an operation).
    #[must_use]
    pub fn open_savepoints(&self) -> usize {
        self.savepoints.lock().len()
    }
}

impl Transactional for InMemoryLedger {
    fn savepoint(&self) -> Savepoint {
        let snapshot = self.state.lock().clone();
        let mut savepoints = self.savepoints.lock();
        savepoints.push(snapshot);
        Savepoint(savepoints.len() - 1)
    }

    fn rollback(&self, savepoint: Savepoint) {
        let mut savepoints = self.savepoints.lock();
        if savepoint.0 >= savepoints.len() {
            warn!(savepoint = savepoint.0, "Rollback to unknown savepoint ignored");
            return;
        }
        let snapshot = savepoints.drain(savepoint.0..).next();
        if let Some(snapshot) = snapshot {
            *self.state.lock() = snapshot;
        }
    }

    fn release(&self, savepoint: Savepoint) {
        self.savepoints.lock().truncate(savepoint.0);
    }
}

impl OutcomeLedger for InMemoryLedger {
    fn mint_pair(
        &self,
        market: MarketId,
        amount: u128,
        payer: Address,
        to: Address,
    ) -> VaultResult<()> {
        let mut state = self.state.lock();
        debit(&mut state.collateral, payer, amount)?;
        credit(&mut state.locked, market, amount)?;
        credit(&mut state.shares, (market, Side::Yes, to), amount)?;
        credit(&mut state.shares, (market, Side::No, to), amount)?;
        Ok(())
    }

    fn merge_pair(
        &self,
        market: MarketId,
        amount: u128,
        from: Address,
        to: Address,
    ) -> VaultResult<()> {
        let mut state = self.state.lock();
        debit(&mut state.shares, (market, Side::Yes, from), amount)?;
        debit(&mut state.shares, (market, Side::No, from), amount)?;
        debit(&mut state.locked, market, amount)?;
        credit(&mut state.collateral, to, amount)?;
        Ok(())
    }

    fn transfer(
        &self,
        market: MarketId,
        side: Side,
        from: Address,
        to: Address,
        amount: u128,
    ) -> VaultResult<()> {
        let mut state = self.state.lock();
        debit(&mut state.shares, (market, side, from), amount)?;
        credit(&mut state.shares, (market, side, to), amount)?;
        Ok(())
    }

    fn transfer_collateral(&self, from: Address, to: Address, amount: u128) -> VaultResult<()> {
        let mut state = self.state.lock();
        debit(&mut state.collateral, from, amount)?;
        credit(&mut state.collateral, to, amount)?;
        Ok(())
    }

    fn send_refund(
        &self,
        from: Address,
        to: Address,
        amount: u128,
        stipend: u64,
    ) -> VaultResult<()> {
        self.transfer_collateral(from, to, amount)?;

        // Run the hook without holding any ledger lock
        let hook = self.hooks.read().get(&to).cloned();
        if let Some(hook) = hook {
            if !hook(to, amount, stipend) {
                self.transfer_collateral(to, from, amount)?;
                return Err(VaultError::TransferFailed(format!(
                    "recipient {} rejected refund of {}",
                    to, amount
                )));
            }
        }
        debug!(recipient = %to, amount, stipend, "Refund delivered");
        Ok(())
    }

    fn balance_of(&self, market: MarketId, side: Side, owner: Address) -> u128 {
        self.state
            .lock()
            .shares
            .get(&(market, side, owner))
            .copied()
            .unwrap_or(0)
    }

    fn collateral_of(&self, owner: Address) -> u128 {
        self.state.lock().collateral.get(&owner).copied().unwrap_or(0)
    }
}
