//! Workload forecasts consumed by the staffing optimizer.
//!
//! Forecasts normally arrive as a (region, week) table. When none is supplied
//! a moving-average baseline over weekly warehouse-to-store volume is used.

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{ForecastRecord, Lane, LaneType, Shipment, WeekKey};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ForecastEntry {
    /// Point forecast in work-units, >= 0
    pub forecast_units: f64,
    /// Reporting only; never read by the optimizer
    pub mape: Option<f64>,
}

/// (region, week) -> point forecast
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkloadForecast {
    entries: BTreeMap<(String, WeekKey), ForecastEntry>,
}

impl WorkloadForecast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, region: impl Into<String>, week: WeekKey, entry: ForecastEntry) -> Result<()> {
        let region = region.into();
        if !entry.forecast_units.is_finite() || entry.forecast_units < 0.0 {
            bail!("forecast for {} {} is negative or not finite: {}", region, week, entry.forecast_units);
        }
        if self.entries.insert((region.clone(), week), entry).is_some() {
            bail!("duplicate forecast for {} {}", region, week);
        }
        Ok(())
    }

    pub fn get(&self, region: &str, week: WeekKey) -> Option<&ForecastEntry> {
        self.entries.get(&(region.to_string(), week))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, WeekKey, &ForecastEntry)> {
        self.entries.iter().map(|((r, w), e)| (r.as_str(), *w, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_records(records: &[ForecastRecord]) -> Result<Self> {
        let mut forecast = Self::new();
        for (i, rec) in records.iter().enumerate() {
            let week: WeekKey = rec.week.parse().with_context(|| format!("forecast row {}", i + 1))?;
            forecast
                .insert(
                    rec.region.clone(),
                    week,
                    ForecastEntry { forecast_units: rec.forecast_units, mape: rec.mape },
                )
                .with_context(|| format!("forecast row {}", i + 1))?;
        }
        Ok(forecast)
    }

    pub fn to_records(&self) -> Vec<ForecastRecord> {
        self.iter()
            .map(|(region, week, e)| ForecastRecord {
                region: region.to_string(),
                week: week.to_string(),
                forecast_units: e.forecast_units,
                mape: e.mape,
            })
            .collect()
    }
}

/// Weekly warehouse-to-store shipment counts per region, keyed by the ISO
/// week of `planned_ship`. Weeks between the first and last observation
/// with no shipments are present with zero.
pub fn weekly_workload(shipments: &[Shipment], lanes: &[Lane]) -> BTreeMap<String, BTreeMap<WeekKey, f64>> {
    let lane_by_id: HashMap<&str, &Lane> = lanes.iter().map(|l| (l.lane_id.as_str(), l)).collect();

    let mut series: BTreeMap<String, BTreeMap<WeekKey, f64>> = BTreeMap::new();
    for s in shipments {
        let Some(lane) = lane_by_id.get(s.lane_id.as_str()) else {
            continue;
        };
        if lane.lane_type != LaneType::WarehouseToStore {
            continue;
        }
        *series
            .entry(lane.region.clone())
            .or_default()
            .entry(WeekKey::of(&s.planned_ship))
            .or_insert(0.0) += 1.0;
    }

    for weeks in series.values_mut() {
        let (Some(first), Some(last)) = (weeks.keys().next().copied(), weeks.keys().next_back().copied()) else {
            continue;
        };
        let mut week = first;
        while week < last {
            weeks.entry(week).or_insert(0.0);
            match week.next() {
                Some(next) => week = next,
                None => break,
            }
        }
    }
    series
}

/// Trailing-window mean forecaster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovingAverageForecaster {
    pub window: usize,
    /// Weeks forecast past the end of the history
    pub horizon: usize,
}

impl Default for MovingAverageForecaster {
    fn default() -> Self {
        Self { window: 4, horizon: 2 }
    }
}

impl MovingAverageForecaster {
    fn trailing_mean(&self, values: &[f64]) -> f64 {
        let window = self.window.max(1).min(values.len());
        if window == 0 {
            return 0.0;
        }
        values[values.len() - window..].iter().sum::<f64>() / window as f64
    }

    /// Mean absolute percentage error of a forecast fitted on the first 80%
    /// of `values` against the trailing 20%. Zero actuals are skipped.
    pub fn holdout_mape(&self, values: &[f64]) -> Option<f64> {
        let split = values.len() * 4 / 5;
        let (train, test) = values.split_at(split);
        if train.is_empty() || test.is_empty() {
            return None;
        }
        let prediction = self.trailing_mean(train);
        let errors: Vec<f64> = test
            .iter()
            .filter(|a| **a != 0.0)
            .map(|a| (a - prediction).abs() / a.abs())
            .collect();
        if errors.is_empty() {
            None
        } else {
            Some(errors.iter().sum::<f64>() / errors.len() as f64)
        }
    }

    /// Forecast the `horizon` weeks following the last week of `series`
    pub fn forecast_series(&self, series: &BTreeMap<WeekKey, f64>) -> Vec<(WeekKey, ForecastEntry)> {
        let Some(last) = series.keys().next_back().copied() else {
            return Vec::new();
        };
        let values: Vec<f64> = series.values().copied().collect();
        let entry = ForecastEntry {
            forecast_units: self.trailing_mean(&values).max(0.0),
            mape: self.holdout_mape(&values),
        };

        let mut out = Vec::with_capacity(self.horizon);
        let mut week = last;
        for _ in 0..self.horizon {
            match week.next() {
                Some(next) => week = next,
                None => break,
            }
            out.push((week, entry));
        }
        out
    }

    /// Baseline forecast for every region seen on a warehouse-to-store lane
    pub fn forecast(&self, shipments: &[Shipment], lanes: &[Lane]) -> WorkloadForecast {
        let mut forecast = WorkloadForecast::new();
        for (region, series) in weekly_workload(shipments, lanes) {
            debug!(region = %region, weeks = series.len(), "Fitting moving-average forecast");
            for (week, entry) in self.forecast_series(&series) {
                forecast.entries.insert((region.clone(), week), entry);
            }
        }
        info!(
            entries = forecast.len(),
            window = self.window,
            horizon = self.horizon,
            "Baseline workload forecast built"
        );
        forecast
    }
}
