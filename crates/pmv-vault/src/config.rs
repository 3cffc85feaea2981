//! Vault configuration.

use serde::{Deserialize, Serialize};

/// Withdrawal cooldown used unless configured otherwise (24 hours).
pub const DEFAULT_WITHDRAW_COOLDOWN_SECS: u64 = 24 * 60 * 60;

/// Vault-side parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Minimum time between a provider's last deposit and a withdrawal.
    #[serde(default = "default_withdraw_cooldown_secs")]
    pub withdraw_cooldown_secs: u64,
    /// Keeper cut of collateral released by a rebalance, in bps.
    #[serde(default = "default_rebalance_bounty_bps")]
    pub rebalance_bounty_bps: u32,
}

fn default_withdraw_cooldown_secs() -> u64 {
    DEFAULT_WITHDRAW_COOLDOWN_SECS
}

fn default_rebalance_bounty_bps() -> u32 {
    2_000
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            withdraw_cooldown_secs: default_withdraw_cooldown_secs(),
            rebalance_bounty_bps: default_rebalance_bounty_bps(),
        }
    }
}
