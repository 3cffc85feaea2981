//! Two-slot TWAP oracle over the pool's cumulative price counter.
//!
//! The oracle only moves when `refresh` is called with a new observation.
//! Time passing on its own never changes stored state, so a market that
//! sat idle for a week reads exactly the same TWAP until someone refreshes.

use alloy::primitives::U256;
use pmv_core::math::{q112, to_u128, BPS};
use tracing::debug;

/// Minimum spacing between stored observations.
pub const MIN_UPDATE_INTERVAL_SECS: u32 = 30 * 60;

/// Lowest P(YES) the oracle reports.
pub const MIN_TWAP_BPS: u32 = 1;

/// Highest P(YES) the oracle reports.
pub const MAX_TWAP_BPS: u32 = BPS - 1;

/// Cumulative price reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwapObservation {
    /// Seconds since Unix epoch.
    pub timestamp: u32,
    /// Running sum of UQ112x112 `NO/YES` price times elapsed seconds.
    pub cumulative: U256,
}

impl TwapObservation {
    #[must_use]
    pub fn new(timestamp: u32, cumulative: U256) -> Self {
        Self {
            timestamp,
            cumulative,
        }
    }
}

/// Per-market observation pair with a cached probability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwapOracle {
    oldest: Option<TwapObservation>,
    newest: TwapObservation,
    cached_bps: Option<u32>,
    cached_at: u32,
}

impl TwapOracle {
    /// Start with a single observation; TWAP is unavailable until the
    /// first successful refresh.
    #[must_use]
    pub fn new(first: TwapObservation) -> Self {
        Self {
            oldest: None,
            newest: first,
            cached_bps: None,
            cached_at: first.timestamp,
        }
    }

    /// Record `observation` if at least `min_interval_secs` passed since the
    /// newest stored one. Returns whether the oracle advanced.
    ///
    /// Never moves the newest timestamp backwards.
    pub fn refresh(&mut self, observation: TwapObservation, min_interval_secs: u32) -> bool {
        let due = self.newest.timestamp.saturating_add(min_interval_secs);
        if observation.timestamp < due || observation.timestamp <= self.newest.timestamp {
            return false;
        }

        let previous = self.newest;
        self.oldest = Some(previous);
        self.newest = observation;
        self.cached_bps = probability_bps(&previous, &observation);
        self.cached_at = observation.timestamp;

        debug!(
            from = previous.timestamp,
            to = observation.timestamp,
            twap_bps = ?self.cached_bps,
            "TWAP observation recorded"
        );
        true
    }

    /// Time-weighted P(YES) in bps, `None` until two observations exist.
    #[must_use]
    pub fn twap_bps(&self) -> Option<u32> {
        self.cached_bps
    }

    /// Timestamp at which the cached value was computed.
    #[must_use]
    pub fn cached_at(&self) -> u32 {
        self.cached_at
    }

    #[must_use]
    pub fn oldest(&self) -> Option<TwapObservation> {
        self.oldest
    }

    #[must_use]
    pub fn newest(&self) -> TwapObservation {
        self.newest
    }
}

/// Convert the average `NO/YES` ratio between two observations into
/// `P(YES) = 1e4·r / (2^112 + r)`, clamped to `[1, 9999]`.
///
/// The cumulative counter is allowed to wrap.
#[must_use]
pub fn probability_bps(oldest: &TwapObservation, newest: &TwapObservation) -> Option<u32> {
    let elapsed = newest.timestamp.checked_sub(oldest.timestamp)?;
    if elapsed == 0 {
        return None;
    }
    let average = newest.cumulative.wrapping_sub(oldest.cumulative) / U256::from(elapsed);
    let bps = ratio_to_bps(average);
    Some(bps.clamp(MIN_TWAP_BPS, MAX_TWAP_BPS))
}

fn ratio_to_bps(ratio: U256) -> u32 {
    let unit = q112();
    let bps = U256::from(BPS);
    let Some(denominator) = unit.checked_add(ratio) else {
        return MAX_TWAP_BPS;
    };
    let value = match ratio.checked_mul(bps) {
        Some(numerator) => numerator / denominator,
        // 1e4·r/(q+r) = 1e4 − 1e4·q/(q+r)
        None => bps - (unit * bps) / denominator,
    };
    to_u128(value)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(MAX_TWAP_BPS)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cumulative value for a constant `no/yes` ratio held for `secs`.
    fn accrue(yes: u128, no: u128, secs: u32) -> U256 {
        ((U256::from(no) << 112usize) / U256::from(yes)) * U256::from(secs)
    }

    #[test]
    fn test_unavailable_until_second_observation() {
        let oracle = TwapOracle::new(TwapObservation::new(1_000, U256::ZERO));
        assert_eq!(oracle.twap_bps(), None);
        assert!(oracle.oldest().is_none());
    }

    #[test]
    fn test_refresh_respects_min_interval() {
        let mut oracle = TwapOracle::new(TwapObservation::new(1_000, U256::ZERO));
        let early = TwapObservation::new(1_000 + MIN_UPDATE_INTERVAL_SECS - 1, accrue(1, 1, 1_799));
        assert!(!oracle.refresh(early, MIN_UPDATE_INTERVAL_SECS));
        assert_eq!(oracle.newest().timestamp, 1_000);

        let on_time = TwapObservation::new(1_000 + MIN_UPDATE_INTERVAL_SECS, accrue(1, 1, 1_800));
        assert!(oracle.refresh(on_time, MIN_UPDATE_INTERVAL_SECS));
        assert_eq!(oracle.oldest().map(|o| o.timestamp), Some(1_000));
        assert_eq!(oracle.newest().timestamp, 2_800);
        assert_eq!(oracle.twap_bps(), Some(5_000));
    }

    #[test]
    fn test_refresh_never_moves_backwards() {
        let mut oracle = TwapOracle::new(TwapObservation::new(10_000, U256::ZERO));
        assert!(!oracle.refresh(TwapObservation::new(5_000, U256::ZERO), 0));
        assert!(!oracle.refresh(TwapObservation::new(10_000, U256::ZERO), 0));
        assert_eq!(oracle.newest().timestamp, 10_000);
    }

    #[test]
    fn test_twap_matches_closed_form() {
        // NO/(YES+NO) for a handful of reserve pairs, within 1 bps
        let pairs = [(100u128, 300u128), (300, 100), (1, 1), (7, 3), (1_000_000, 1), (1, 1_000_000)];
        for (yes, no) in pairs {
            let first = TwapObservation::new(0, U256::ZERO);
            let second = TwapObservation::new(3_600, accrue(yes, no, 3_600));
            let got = probability_bps(&first, &second).unwrap();
            let expected = ((no * 10_000) / (yes + no)).clamp(1, 9_999) as u32;
            assert!(got.abs_diff(expected) <= 1, "yes={yes} no={no} got={got} expected={expected}");
        }
    }

    #[test]
    fn test_twap_is_time_weighted() {
        // 1h at 50% then 3h at 75%: avg ratio = (1 + 3*3)/4 = 2.5 -> 2.5/3.5 = 7142
        let start = TwapObservation::new(0, U256::ZERO);
        let end = TwapObservation::new(4 * 3_600, accrue(1, 1, 3_600) + accrue(1, 3, 3 * 3_600));
        assert_eq!(probability_bps(&start, &end), Some(7_142));
    }

    #[test]
    fn test_cumulative_wraparound() {
        let start_cum = U256::MAX - accrue(1, 1, 100) + U256::from(1u8);
        let start = TwapObservation::new(0, start_cum);
        let end = TwapObservation::new(3_600, start_cum.wrapping_add(accrue(100, 300, 3_600)));
        assert_eq!(probability_bps(&start, &end), Some(7_500));
    }

    #[test]
    fn test_extreme_ratios_are_clamped() {
        assert_eq!(ratio_to_bps(U256::ZERO).clamp(MIN_TWAP_BPS, MAX_TWAP_BPS), 1);
        assert_eq!(ratio_to_bps(U256::MAX), MAX_TWAP_BPS);
        let start = TwapObservation::new(0, U256::ZERO);
        let end = TwapObservation::new(1, U256::MAX >> 1usize);
        assert_eq!(probability_bps(&start, &end), Some(MAX_TWAP_BPS));
    }

    #[test]
    fn test_observations_untouched_without_refresh() {
        let mut oracle = TwapOracle::new(TwapObservation::new(0, U256::ZERO));
        oracle.refresh(TwapObservation::new(3_600, accrue(1, 1, 3_600)), MIN_UPDATE_INTERVAL_SECS);
        let before = oracle.clone();
        // nothing but reads for a week
        for _ in 0..7 {
            assert_eq!(oracle.twap_bps(), Some(5_000));
        }
        assert_eq!(oracle, before);
    }
}
