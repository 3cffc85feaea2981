//! Injectable time source.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{VaultError, VaultResult};

/// Abstraction over time source for testability.
pub trait Clock: Send + Sync {
    /// Returns current time in seconds since Unix epoch.
    fn now_secs(&self) -> u64;
}

/// Narrow a Unix timestamp to the 32-bit width stored in vault records.
pub fn timestamp32(secs: u64) -> VaultResult<u32> {
    u32::try_from(secs).map_err(|_| VaultError::Overflow("timestamp beyond 32 bits"))
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_secs: u64) -> Self {
        Self {
            now: AtomicU64::new(start_secs),
        }
    }

    pub fn set(&self, secs: u64) {
        self.now.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
