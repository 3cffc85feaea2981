//! Simulator configuration.

use crate::error::{AppError, AppResult};
use pmv_router::RouterConfig;
use pmv_telemetry::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Market setup and the grids the tables are computed over.
///
/// Sizes are given in whole collateral units and scaled by `unit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Base units per collateral unit. Must be a power of ten.
    #[serde(default = "default_unit")]
    pub unit: u64,

    /// Simulated start time (Unix seconds).
    #[serde(default = "default_start_secs")]
    pub start_secs: u64,

    #[serde(default = "default_days_to_close")]
    pub days_to_close: u64,

    /// Shares per side seeded into the external pool.
    #[serde(default = "default_pool_depth")]
    pub pool_depth: u64,

    #[serde(default = "default_pool_fee_bps")]
    pub pool_fee_bps: u32,

    /// YES shares deposited into the vault before trading.
    #[serde(default = "default_vault_inventory")]
    pub vault_yes: u64,

    /// NO shares deposited into the vault before trading.
    #[serde(default = "default_vault_inventory")]
    pub vault_no: u64,

    /// Buy sizes for the venue-split and OTC vs AMM tables.
    #[serde(default = "default_trade_sizes")]
    pub trade_sizes: Vec<u64>,

    /// Share of the vault held by the larger side, in bps (5000..=10000).
    #[serde(default = "default_imbalances_bps")]
    pub imbalances_bps: Vec<u32>,

    #[serde(default = "default_hours_to_close")]
    pub hours_to_close: Vec<u64>,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_unit() -> u64 {
    1_000_000
}

fn default_start_secs() -> u64 {
    1_700_000_000
}

fn default_days_to_close() -> u64 {
    30
}

fn default_pool_depth() -> u64 {
    1_000
}

fn default_pool_fee_bps() -> u32 {
    30
}

fn default_vault_inventory() -> u64 {
    100
}

fn default_trade_sizes() -> Vec<u64> {
    vec![1, 10, 50, 100, 250, 500]
}

fn default_imbalances_bps() -> Vec<u32> {
    vec![5_000, 6_000, 7_000, 8_000, 9_000, 10_000]
}

fn default_hours_to_close() -> Vec<u64> {
    vec![48, 24, 12, 6, 2, 1]
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            unit: default_unit(),
            start_secs: default_start_secs(),
            days_to_close: default_days_to_close(),
            pool_depth: default_pool_depth(),
            pool_fee_bps: default_pool_fee_bps(),
            vault_yes: default_vault_inventory(),
            vault_no: default_vault_inventory(),
            trade_sizes: default_trade_sizes(),
            imbalances_bps: default_imbalances_bps(),
            hours_to_close: default_hours_to_close(),
            router: RouterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SimConfig {
    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate().map_err(AppError::Config)?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !is_power_of_ten(self.unit) {
            return Err(format!("unit must be a power of ten, got {}", self.unit));
        }
        if self.days_to_close == 0 {
            return Err("days_to_close must be positive".to_string());
        }
        if self.pool_depth == 0 {
            return Err("pool_depth must be positive".to_string());
        }
        if self.trade_sizes.is_empty() || self.trade_sizes.contains(&0) {
            return Err("trade_sizes must be non-empty and positive".to_string());
        }
        if let Some(bad) = self
            .imbalances_bps
            .iter()
            .find(|b| !(5_000..=10_000).contains(*b))
        {
            return Err(format!("imbalance {bad} outside 5000..=10000"));
        }
        self.router.validate()?;
        self.logging.validate()
    }

    /// Scale whole units to base units.
    #[must_use]
    pub fn scaled(&self, units: u64) -> u128 {
        u128::from(units) * u128::from(self.unit)
    }

    #[must_use]
    pub fn close_time(&self) -> u64 {
        self.start_secs + self.days_to_close * 86_400
    }
}

fn is_power_of_ten(mut value: u64) -> bool {
    if value == 0 {
        return false;
    }
    while value % 10 == 0 {
        value /= 10;
    }
    value == 1
}
