//! Process-wide reentrancy guard.
//!
//! One guard covers every entry point and a whole multicall batch. A call
//! made from inside a guarded operation on the same thread (for example by
//! a refund recipient's receive hook) is rejected; calls from other threads
//! wait for the running operation to finish.

use std::cell::Cell;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use pmv_core::{VaultError, VaultResult};
use pmv_telemetry::Metrics;
use tracing::warn;

/// Guard state: `true` while an operation is running.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    entered: ReentrantMutex<Cell<bool>>,
}

/// Held for the duration of one operation. Dropping it re-opens the guard.
pub struct GuardToken<'a> {
    held: ReentrantMutexGuard<'a, Cell<bool>>,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.held.set(false);
    }
}

impl ReentrancyGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the guard, or fail with `Reentrancy` if this thread is
    /// already inside a guarded operation.
    pub fn enter(&self) -> VaultResult<GuardToken<'_>> {
        let held = self.entered.lock();
        if held.get() {
            warn!("Reentrant call rejected");
            Metrics::reentrancy_rejected();
            return Err(VaultError::Reentrancy);
        }
        held.set(true);
        Ok(GuardToken { held })
    }

    /// Whether an operation is running. Never blocks.
    #[must_use]
    pub fn is_entered(&self) -> bool {
        self.entered.try_lock().map_or(true, |held| held.get())
    }
}
