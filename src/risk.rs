//! Risk adjustment: turns recently attributed warehouse delay into a
//! multiplicative capacity buffer for the optimizer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{RiskConfig, RiskStatistic};
use crate::models::{DriverRanking, GroupBy, WeekKey};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    pub region: String,
    /// Planning week the factor applies to
    pub week: WeekKey,
    /// Attributed week the signal was read from, if any
    pub source_week: Option<WeekKey>,
    pub signal_days: f64,
    pub factor: f64,
}

impl RiskConfig {
    /// Piecewise-linear lookup, clamped at both ends
    pub fn factor_for(&self, signal_days: f64) -> f64 {
        let bps = &self.breakpoints;
        let (first, last) = match (bps.first(), bps.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return 1.0,
        };
        if signal_days.is_nan() || signal_days <= first.delay_days {
            return first.factor;
        }
        if signal_days >= last.delay_days {
            return last.factor;
        }
        for pair in bps.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if signal_days <= hi.delay_days {
                let t = (signal_days - lo.delay_days) / (hi.delay_days - lo.delay_days);
                return lo.factor + t * (hi.factor - lo.factor);
            }
        }
        last.factor
    }

    /// Delay signal carried by one region ranking
    pub fn signal(&self, ranking: &DriverRanking) -> f64 {
        self.buckets
            .iter()
            .filter_map(|b| ranking.contribution(*b))
            .map(|c| match self.statistic {
                RiskStatistic::Mean => c.mean_delay_days,
                RiskStatistic::Total => c.total_delay_days,
            })
            .sum()
    }
}

/// Index of region rankings used to look up the period driving each plan
pub struct RiskIndex<'a> {
    config: &'a RiskConfig,
    by_region: BTreeMap<&'a str, BTreeMap<WeekKey, &'a DriverRanking>>,
}

impl<'a> RiskIndex<'a> {
    /// Only region-level rankings are indexed; lane rankings are ignored
    pub fn new(config: &'a RiskConfig, rankings: &'a [DriverRanking]) -> Self {
        let mut by_region: BTreeMap<&str, BTreeMap<WeekKey, &DriverRanking>> = BTreeMap::new();
        for r in rankings.iter().filter(|r| r.dimension == GroupBy::Region) {
            by_region.entry(r.key.as_str()).or_default().insert(r.week, r);
        }
        Self { config, by_region }
    }

    /// Uses the ranking for `week` itself, else the latest earlier week,
    /// else a zero signal.
    pub fn assess(&self, region: &str, week: WeekKey) -> RiskAssessment {
        let source = self
            .by_region
            .get(region)
            .and_then(|weeks| weeks.range(..=week).next_back())
            .map(|(w, r)| (*w, *r));

        let (source_week, signal_days) = match source {
            Some((w, ranking)) => (Some(w), self.config.signal(ranking)),
            None => {
                warn!(region, %week, "No attributed history for region, using baseline risk factor");
                (None, 0.0)
            }
        };

        RiskAssessment {
            region: region.to_string(),
            week,
            source_week,
            signal_days,
            factor: self.config.factor_for(signal_days),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DelayBucket, DriverContribution};

    fn ranking(region: &str, week: &str, picking: f64, cutoff: f64, transit: f64) -> DriverRanking {
        let contrib = |bucket, mean: f64| DriverContribution {
            bucket,
            rank: 0,
            total_delay_days: mean * 10.0,
            mean_delay_days: mean,
        };
        DriverRanking {
            dimension: GroupBy::Region,
            key: region.into(),
            week: week.parse().unwrap(),
            shipments: 10,
            drivers: vec![
                contrib(DelayBucket::PickingBottleneck, picking),
                contrib(DelayBucket::CutoffMiss, cutoff),
                contrib(DelayBucket::TransitDelay, transit),
            ],
        }
    }

    #[test]
    fn test_factor_interpolates_and_clamps() {
        let cfg = RiskConfig::default();
        assert_eq!(cfg.factor_for(-3.0), 1.0);
        assert_eq!(cfg.factor_for(0.0), 1.0);
        assert!((cfg.factor_for(0.3) - 1.125).abs() < 1e-12);
        assert_eq!(cfg.factor_for(1.0), 1.35);
        assert_eq!(cfg.factor_for(50.0), 1.35);
    }

    #[test]
    fn test_factor_is_monotonic() {
        let cfg = RiskConfig::default();
        let mut prev = cfg.factor_for(-1.0);
        for i in 0..300 {
            let f = cfg.factor_for(i as f64 * 0.005);
            assert!(f >= prev && f >= 1.0);
            prev = f;
        }
    }

    #[test]
    fn test_signal_uses_only_configured_buckets() {
        let cfg = RiskConfig::default();
        let r = ranking("EU", "2024-W10", 0.2, 0.1, 5.0);
        assert!((cfg.signal(&r) - 0.3).abs() < 1e-12);

        let totals = RiskConfig { statistic: RiskStatistic::Total, ..RiskConfig::default() };
        assert!((totals.signal(&r) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_assess_falls_back_to_latest_earlier_week() {
        let cfg = RiskConfig::default();
        let rankings = vec![
            ranking("EU", "2024-W08", 0.5, 0.0, 0.0),
            ranking("EU", "2024-W09", 1.0, 0.0, 0.0),
            ranking("US", "2024-W12", 1.0, 0.0, 0.0),
        ];
        let index = RiskIndex::new(&cfg, &rankings);

        let exact = index.assess("EU", "2024-W09".parse().unwrap());
        assert_eq!(exact.source_week.map(|w| w.to_string()), Some("2024-W09".to_string()));
        assert_eq!(exact.factor, 1.35);

        let ahead = index.assess("EU", "2024-W11".parse().unwrap());
        assert_eq!(ahead.source_week, exact.source_week);

        let before_history = index.assess("US", "2024-W10".parse().unwrap());
        assert_eq!(before_history.source_week, None);
        assert_eq!(before_history.factor, 1.0);
    }
}
