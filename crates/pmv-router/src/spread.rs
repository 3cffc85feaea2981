//! OTC spread model.
//!
//! relative = base + imbalance boost + time boost, capped at `max_spread_bps`
//! absolute = max(price·relative/1e4, min_absolute_spread_bps)
//!
//! The imbalance boost only applies when the order draws on the side the
//! vault holds less of. The time boost ramps linearly over the final 24h.

use pmv_core::math::BPS;

use crate::config::RouterConfig;

const TIME_BOOST_HORIZON_SECS: u64 = 24 * 60 * 60;
const BALANCED_BPS: u128 = 5_000;

/// Relative spread in bps for an OTC fill that draws `consumed` shares'
/// side of inventory while the vault holds `other` on the opposite side.
#[must_use]
pub fn relative_spread_bps(config: &RouterConfig, consumed: u128, other: u128, secs_to_close: u64) -> u32 {
    let imbalance = imbalance_boost_bps(config, consumed, other);
    let time = time_boost_bps(config, secs_to_close);
    config
        .base_relative_spread_bps
        .saturating_add(imbalance)
        .saturating_add(time)
        .min(config.max_spread_bps)
}

fn imbalance_boost_bps(config: &RouterConfig, consumed: u128, other: u128) -> u32 {
    if consumed >= other {
        return 0;
    }
    let total = consumed.saturating_add(other);
    // other > consumed, so total > 0 and larger = other
    let imbalance = other.saturating_mul(u128::from(BPS)) / total;
    let excess = imbalance.saturating_sub(BALANCED_BPS);
    let boost = u128::from(config.max_imbalance_boost_bps) * excess / BALANCED_BPS;
    u32::try_from(boost).unwrap_or(config.max_imbalance_boost_bps)
}

fn time_boost_bps(config: &RouterConfig, secs_to_close: u64) -> u32 {
    if secs_to_close >= TIME_BOOST_HORIZON_SECS {
        return 0;
    }
    let elapsed = TIME_BOOST_HORIZON_SECS - secs_to_close;
    let boost = u64::from(config.max_time_boost_bps) * elapsed / TIME_BOOST_HORIZON_SECS;
    u32::try_from(boost).unwrap_or(config.max_time_boost_bps)
}

/// Absolute spread in bps of one collateral unit.
#[must_use]
pub fn absolute_spread_bps(config: &RouterConfig, price_bps: u32, relative_bps: u32) -> u32 {
    let scaled = u64::from(price_bps) * u64::from(relative_bps) / u64::from(BPS);
    u32::try_from(scaled)
        .unwrap_or(BPS)
        .max(config.min_absolute_spread_bps)
}

/// Price a buyer pays per share.
#[must_use]
pub fn ask_bps(price_bps: u32, spread_bps: u32) -> u32 {
    price_bps.saturating_add(spread_bps).min(BPS)
}

/// Price a seller receives per share.
#[must_use]
pub fn bid_bps(price_bps: u32, spread_bps: u32) -> u32 {
    price_bps.saturating_sub(spread_bps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAR: u64 = 30 * 24 * 3_600;

    #[test]
    fn test_balanced_vault_uses_base_spread() {
        let config = RouterConfig::default();
        assert_eq!(relative_spread_bps(&config, 100, 100, FAR), 100);
        assert_eq!(absolute_spread_bps(&config, 5_000, 100), 50);
    }

    #[test]
    fn test_imbalance_boost_only_when_draining_scarce_side() {
        let config = RouterConfig::default();
        // 75% imbalance: 400 · 2500/5000
        assert_eq!(relative_spread_bps(&config, 25, 75, FAR), 300);
        assert_eq!(relative_spread_bps(&config, 75, 25, FAR), 100);
    }

    #[test]
    fn test_time_boost_ramps_over_final_day() {
        let config = RouterConfig::default();
        assert_eq!(relative_spread_bps(&config, 10, 10, 86_400), 100);
        assert_eq!(relative_spread_bps(&config, 10, 10, 43_200), 200);
        assert_eq!(relative_spread_bps(&config, 10, 10, 0), 300);
    }

    #[test]
    fn test_spread_is_capped() {
        let config = RouterConfig::default();
        assert_eq!(relative_spread_bps(&config, 0, 100, 0), 500);
    }

    #[test]
    fn test_absolute_floor() {
        let config = RouterConfig::default();
        assert_eq!(absolute_spread_bps(&config, 1_000, 100), 20);
    }

    #[test]
    fn test_ask_and_bid_are_bounded() {
        assert_eq!(ask_bps(9_990, 50), 10_000);
        assert_eq!(ask_bps(5_000, 50), 5_050);
        assert_eq!(bid_bps(10, 20), 0);
        assert_eq!(bid_bps(5_000, 50), 4_950);
    }
}
