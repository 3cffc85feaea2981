//! Router configuration.

use pmv_core::math::BPS;
use pmv_vault::VaultConfig;
use serde::{Deserialize, Serialize};

/// Routing, pricing and safety parameters.
///
/// All `*_bps` values are basis points; percentages are whole percent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Minimum spacing between stored TWAP observations.
    #[serde(default = "default_min_twap_update_interval_secs")]
    pub min_twap_update_interval_secs: u32,

    /// OTC is disabled when spot and TWAP differ by more than this.
    #[serde(default = "default_max_twap_deviation_bps")]
    pub max_twap_deviation_bps: u32,

    /// Largest OTC fill as a percentage of the vault side it draws on.
    #[serde(default = "default_max_vault_fill_pct")]
    pub max_vault_fill_pct: u32,

    /// OTC spread floor, relative to the share price.
    #[serde(default = "default_base_relative_spread_bps")]
    pub base_relative_spread_bps: u32,

    /// Extra spread at full imbalance when the order drains the scarce side.
    #[serde(default = "default_max_imbalance_boost_bps")]
    pub max_imbalance_boost_bps: u32,

    /// Extra spread reached at market close, ramping over the final day.
    #[serde(default = "default_max_time_boost_bps")]
    pub max_time_boost_bps: u32,

    /// Relative spread cap.
    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: u32,

    /// Absolute spread floor in bps of one collateral unit.
    #[serde(default = "default_min_absolute_spread_bps")]
    pub min_absolute_spread_bps: u32,

    /// Share of OTC spread income paid to LPs. The rest funds the
    /// rebalance budget.
    #[serde(default = "default_otc_spread_lp_share_bps")]
    pub otc_spread_lp_share_bps: u32,

    /// Largest P(YES) move an AMM fill may cause.
    #[serde(default = "default_max_price_impact_bps")]
    pub max_price_impact_bps: u32,

    /// Minting stops once the deposited side's notional would exceed the
    /// other side's by this ratio.
    #[serde(default = "default_max_imbalance_ratio_bps")]
    pub max_imbalance_ratio_bps: u32,

    /// OTC and mint are disabled this close to market close.
    #[serde(default = "default_close_window_secs")]
    pub close_window_secs: u64,

    /// Execution budget forwarded with refunds.
    #[serde(default = "default_refund_gas_stipend")]
    pub refund_gas_stipend: u64,

    #[serde(default)]
    pub vault: VaultConfig,
}

fn default_min_twap_update_interval_secs() -> u32 {
    pmv_oracle::MIN_UPDATE_INTERVAL_SECS
}

fn default_max_twap_deviation_bps() -> u32 {
    500
}

fn default_max_vault_fill_pct() -> u32 {
    30
}

fn default_base_relative_spread_bps() -> u32 {
    100
}

fn default_max_imbalance_boost_bps() -> u32 {
    400
}

fn default_max_time_boost_bps() -> u32 {
    200
}

fn default_max_spread_bps() -> u32 {
    500
}

fn default_min_absolute_spread_bps() -> u32 {
    20
}

fn default_otc_spread_lp_share_bps() -> u32 {
    8_000
}

fn default_max_price_impact_bps() -> u32 {
    1_200
}

fn default_max_imbalance_ratio_bps() -> u32 {
    20_000
}

fn default_close_window_secs() -> u64 {
    3_600
}

fn default_refund_gas_stipend() -> u64 {
    10_000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_twap_update_interval_secs: default_min_twap_update_interval_secs(),
            max_twap_deviation_bps: default_max_twap_deviation_bps(),
            max_vault_fill_pct: default_max_vault_fill_pct(),
            base_relative_spread_bps: default_base_relative_spread_bps(),
            max_imbalance_boost_bps: default_max_imbalance_boost_bps(),
            max_time_boost_bps: default_max_time_boost_bps(),
            max_spread_bps: default_max_spread_bps(),
            min_absolute_spread_bps: default_min_absolute_spread_bps(),
            otc_spread_lp_share_bps: default_otc_spread_lp_share_bps(),
            max_price_impact_bps: default_max_price_impact_bps(),
            max_imbalance_ratio_bps: default_max_imbalance_ratio_bps(),
            close_window_secs: default_close_window_secs(),
            refund_gas_stipend: default_refund_gas_stipend(),
            vault: VaultConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Validate configuration values.
    ///
    /// Returns Err if:
    /// - a bps share or price parameter is outside `[0, 10000]`
    /// - `max_vault_fill_pct` is 0 or above 100
    /// - `max_spread_bps` is below `base_relative_spread_bps`
    /// - `max_imbalance_ratio_bps` is below 1:1
    pub fn validate(&self) -> Result<(), String> {
        let bounded = [
            ("max_twap_deviation_bps", self.max_twap_deviation_bps),
            ("base_relative_spread_bps", self.base_relative_spread_bps),
            ("max_spread_bps", self.max_spread_bps),
            ("min_absolute_spread_bps", self.min_absolute_spread_bps),
            ("otc_spread_lp_share_bps", self.otc_spread_lp_share_bps),
            ("max_price_impact_bps", self.max_price_impact_bps),
            ("rebalance_bounty_bps", self.vault.rebalance_bounty_bps),
        ];
        for (name, value) in bounded {
            if value > BPS {
                return Err(format!("{name} ({value}) must be at most {BPS}"));
            }
        }

        if self.max_vault_fill_pct == 0 || self.max_vault_fill_pct > 100 {
            return Err(format!(
                "max_vault_fill_pct ({}) must be within 1..=100",
                self.max_vault_fill_pct
            ));
        }

        if self.max_spread_bps < self.base_relative_spread_bps {
            return Err(format!(
                "max_spread_bps ({}) must be at least base_relative_spread_bps ({})",
                self.max_spread_bps, self.base_relative_spread_bps
            ));
        }

        if self.max_imbalance_ratio_bps < BPS {
            return Err(format!(
                "max_imbalance_ratio_bps ({}) must be at least {BPS}",
                self.max_imbalance_ratio_bps
            ));
        }

        if self.min_twap_update_interval_secs == 0 {
            return Err("min_twap_update_interval_secs must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RouterConfig::default();
        assert_eq!(config.min_twap_update_interval_secs, 1_800);
        assert_eq!(config.max_vault_fill_pct, 30);
        assert_eq!(config.otc_spread_lp_share_bps, 8_000);
        assert_eq!(config.vault.withdraw_cooldown_secs, 86_400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: RouterConfig = toml::from_str("").unwrap();
        assert_eq!(config, RouterConfig::default());
    }

    #[test]
    fn test_nested_vault_section() {
        let config: RouterConfig = toml::from_str(
            r#"
            max_vault_fill_pct = 50

            [vault]
            withdraw_cooldown_secs = 21600
            "#,
        )
        .unwrap();
        assert_eq!(config.max_vault_fill_pct, 50);
        assert_eq!(config.vault.withdraw_cooldown_secs, 21_600);
        assert_eq!(config.vault.rebalance_bounty_bps, 2_000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = RouterConfig {
            max_vault_fill_pct: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RouterConfig {
            otc_spread_lp_share_bps: 10_001,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("otc_spread_lp_share_bps"));

        let config = RouterConfig {
            max_spread_bps: 50,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
