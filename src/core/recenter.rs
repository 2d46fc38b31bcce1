// Grid recentering when price dwells at an edge or drifts from the center

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::RecenterConfig;

const MIN_LOWER_BOUND: Decimal = dec!(0.000000001);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridBounds {
    #[serde(with = "rust_decimal::serde::float")]
    pub low: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub high: Decimal,
}

impl GridBounds {
    pub fn new(low: Decimal, high: Decimal) -> Self {
        Self { low, high }
    }

    pub fn width(&self) -> Decimal {
        self.high - self.low
    }

    pub fn center(&self) -> Decimal {
        (self.low + self.high) / dec!(2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecenterReason {
    /// Price sat at an edge for at least this many seconds
    EdgeDwell(i64),
    /// Price moved at least `drift_pct` of the width away from the center
    Drift,
}

/// Remembers when price first reached an edge; cleared when it leaves
#[derive(Debug, Clone, Default)]
pub struct DwellTracker {
    hit_since: Option<DateTime<Utc>>,
}

impl DwellTracker {
    /// Seconds spent continuously at the edge, including this observation
    pub fn observe(&mut self, hit: bool, now: DateTime<Utc>) -> Option<i64> {
        if !hit {
            self.hit_since = None;
            return None;
        }
        let since = *self.hit_since.get_or_insert(now);
        Some((now - since).num_seconds())
    }

    pub fn hit_since(&self) -> Option<DateTime<Utc>> {
        self.hit_since
    }

    pub fn reset(&mut self) {
        self.hit_since = None;
    }
}

#[derive(Debug, Clone)]
pub struct RecenterPolicy {
    edge_pct: Decimal,
    dwell_seconds: i64,
    drift_pct: Option<Decimal>,
    dwell: DwellTracker,
}

impl RecenterPolicy {
    pub fn new(edge_pct: Decimal, dwell_seconds: u64, drift_pct: Option<Decimal>) -> Self {
        Self {
            edge_pct,
            dwell_seconds: dwell_seconds as i64,
            drift_pct,
            dwell: DwellTracker::default(),
        }
    }

    pub fn from_config(config: &RecenterConfig) -> Self {
        Self::new(config.edge_pct, config.dwell_seconds, config.drift_pct)
    }

    pub fn is_edge_hit(&self, price: Decimal, bounds: &GridBounds) -> bool {
        let width = bounds.width();
        if width <= Decimal::ZERO {
            return false;
        }
        let band = width * self.edge_pct / dec!(100);
        price <= bounds.low + band || price >= bounds.high - band
    }

    fn is_drifted(&self, price: Decimal, bounds: &GridBounds) -> bool {
        let Some(drift_pct) = self.drift_pct else {
            return false;
        };
        let width = bounds.width();
        width > Decimal::ZERO && (price - bounds.center()).abs() >= width * drift_pct / dec!(100)
    }

    /// Feed one price observation; returns why a recenter is due, if it is
    pub fn evaluate(
        &mut self,
        price: Decimal,
        bounds: &GridBounds,
        now: DateTime<Utc>,
    ) -> Option<RecenterReason> {
        let hit = self.is_edge_hit(price, bounds);
        let dwelled = self.dwell.observe(hit, now);

        if let Some(secs) = dwelled {
            if secs >= self.dwell_seconds {
                return Some(RecenterReason::EdgeDwell(secs));
            }
        }
        if self.is_drifted(price, bounds) {
            return Some(RecenterReason::Drift);
        }
        None
    }

    pub fn dwell(&self) -> &DwellTracker {
        &self.dwell
    }

    pub fn reset(&mut self) {
        self.dwell.reset();
    }
}

/// Shift the bounds so `price` sits in the middle, keeping the width and a positive lower bound
pub fn recenter_bounds(price: Decimal, bounds: &GridBounds) -> GridBounds {
    let width = bounds.width().max(MIN_LOWER_BOUND);
    let low = (price - width / dec!(2)).max(MIN_LOWER_BOUND);
    GridBounds {
        low,
        high: low + width,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bounds() -> GridBounds {
        GridBounds::new(dec!(0.10), dec!(0.30))
    }

    #[test]
    fn test_edge_hit_band() {
        let policy = RecenterPolicy::new(dec!(10), 600, None);
        // width 0.20, band 0.02
        assert!(policy.is_edge_hit(dec!(0.12), &bounds()));
        assert!(policy.is_edge_hit(dec!(0.29), &bounds()));
        assert!(policy.is_edge_hit(dec!(0.05), &bounds()));
        assert!(!policy.is_edge_hit(dec!(0.20), &bounds()));
        assert!(!policy.is_edge_hit(dec!(0.13), &bounds()));
    }

    #[test]
    fn test_dwell_must_be_continuous() {
        let mut policy = RecenterPolicy::new(dec!(10), 600, None);
        let t0 = Utc::now();

        assert_eq!(policy.evaluate(dec!(0.11), &bounds(), t0), None);
        assert_eq!(policy.evaluate(dec!(0.11), &bounds(), t0 + Duration::seconds(300)), None);
        // leaves the edge, dwell resets
        assert_eq!(policy.evaluate(dec!(0.20), &bounds(), t0 + Duration::seconds(400)), None);
        assert!(policy.dwell().hit_since().is_none());
        assert_eq!(policy.evaluate(dec!(0.11), &bounds(), t0 + Duration::seconds(500)), None);
        assert_eq!(policy.evaluate(dec!(0.11), &bounds(), t0 + Duration::seconds(1000)), None);
        assert_eq!(
            policy.evaluate(dec!(0.11), &bounds(), t0 + Duration::seconds(1100)),
            Some(RecenterReason::EdgeDwell(600))
        );
    }

    #[test]
    fn test_drift_triggers_immediately() {
        let mut policy = RecenterPolicy::new(dec!(10), 600, Some(dec!(30)));
        // center 0.20, threshold 0.06
        assert_eq!(policy.evaluate(dec!(0.25), &bounds(), Utc::now()), None);
        assert_eq!(
            policy.evaluate(dec!(0.265), &bounds(), Utc::now()),
            Some(RecenterReason::Drift)
        );
    }

    #[test]
    fn test_recenter_keeps_width() {
        let moved = recenter_bounds(dec!(0.50), &bounds());
        assert_eq!(moved, GridBounds::new(dec!(0.40), dec!(0.60)));
        assert_eq!(moved.width(), bounds().width());
    }

    #[test]
    fn test_recenter_clamps_lower_bound() {
        let moved = recenter_bounds(dec!(0.05), &bounds());
        assert!(moved.low > Decimal::ZERO);
        assert_eq!(moved.low, MIN_LOWER_BOUND);
        assert_eq!(moved.width(), dec!(0.20));
    }
}
