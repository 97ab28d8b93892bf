//! Result Aggregator
//!
//! Collects driver rankings, risk assessments, staffing outcomes and
//! attribution failures into maps keyed by lane/region and week. Partial
//! reports built over disjoint partitions merge into the same result in any
//! order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attribution::AttributionFailure;
use crate::error::{AggregationError, StaffingError};
use crate::models::{DriverRanking, GroupBy, WeekKey, WorkforcePlan};
use crate::risk::RiskAssessment;
use crate::staffing::{PlanOutcomes, StaffingRequest};

pub type DriverKey = (GroupBy, String, WeekKey);
pub type RegionWeek = (String, WeekKey);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyticsReport {
    /// Shipments successfully attributed
    pub attributed: usize,
    pub drivers: BTreeMap<DriverKey, DriverRanking>,
    pub risk: BTreeMap<RegionWeek, RiskAssessment>,
    /// Forecast units each staffing instance was asked to cover
    pub demand: BTreeMap<RegionWeek, f64>,
    pub plans: BTreeMap<RegionWeek, Result<WorkforcePlan, StaffingError>>,
    /// Keyed by shipment id
    pub failures: BTreeMap<String, AttributionFailure>,
}

fn insert_unique<K: Ord + std::fmt::Debug, V>(
    map: &mut BTreeMap<K, V>,
    key: K,
    value: V,
) -> Result<(), AggregationError> {
    if map.contains_key(&key) {
        return Err(AggregationError::DuplicateKey(format!("{:?}", key)));
    }
    map.insert(key, value);
    Ok(())
}

impl AnalyticsReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rankings(&mut self, rankings: Vec<DriverRanking>) -> Result<(), AggregationError> {
        for r in rankings {
            insert_unique(&mut self.drivers, (r.dimension, r.key.clone(), r.week), r)?;
        }
        Ok(())
    }

    pub fn add_risk(&mut self, assessments: Vec<RiskAssessment>) -> Result<(), AggregationError> {
        for a in assessments {
            insert_unique(&mut self.risk, (a.region.clone(), a.week), a)?;
        }
        Ok(())
    }

    pub fn add_demand(&mut self, requests: &[StaffingRequest]) -> Result<(), AggregationError> {
        for r in requests {
            insert_unique(&mut self.demand, (r.region.clone(), r.week), r.forecast_units)?;
        }
        Ok(())
    }

    pub fn add_plans(&mut self, outcomes: PlanOutcomes) -> Result<(), AggregationError> {
        for (key, outcome) in outcomes {
            insert_unique(&mut self.plans, key, outcome)?;
        }
        Ok(())
    }

    pub fn add_failures(&mut self, failures: Vec<AttributionFailure>) -> Result<(), AggregationError> {
        for f in failures {
            insert_unique(&mut self.failures, f.shipment_id.clone(), f)?;
        }
        Ok(())
    }

    /// Combine two partial reports. Keys must not overlap.
    pub fn merge(mut self, other: AnalyticsReport) -> Result<AnalyticsReport, AggregationError> {
        self.attributed += other.attributed;
        for (k, v) in other.drivers {
            insert_unique(&mut self.drivers, k, v)?;
        }
        for (k, v) in other.risk {
            insert_unique(&mut self.risk, k, v)?;
        }
        for (k, v) in other.demand {
            insert_unique(&mut self.demand, k, v)?;
        }
        for (k, v) in other.plans {
            insert_unique(&mut self.plans, k, v)?;
        }
        for (k, v) in other.failures {
            insert_unique(&mut self.failures, k, v)?;
        }
        Ok(self)
    }

    pub fn rankings(&self, dimension: GroupBy) -> impl Iterator<Item = &DriverRanking> {
        self.drivers.values().filter(move |r| r.dimension == dimension)
    }

    pub fn planned(&self) -> impl Iterator<Item = &WorkforcePlan> {
        self.plans.values().filter_map(|o| o.as_ref().ok())
    }

    pub fn driver_records(&self) -> Vec<DriverRecord> {
        self.drivers
            .values()
            .flat_map(|r| {
                r.drivers.iter().map(move |d| DriverRecord {
                    dimension: r.dimension.to_string(),
                    key: r.key.clone(),
                    week: r.week.to_string(),
                    shipments: r.shipments,
                    rank: d.rank,
                    bucket: d.bucket.to_string(),
                    total_delay_days: d.total_delay_days,
                    mean_delay_days: d.mean_delay_days,
                })
            })
            .collect()
    }

    pub fn plan_records(&self) -> Vec<PlanRecord> {
        self.plans
            .iter()
            .map(|((region, week), outcome)| {
                let key = (region.clone(), *week);
                let risk = self.risk.get(&key);
                match outcome {
                    Ok(plan) => PlanRecord {
                        region: region.clone(),
                        week: week.to_string(),
                        status: "optimal".to_string(),
                        forecast_units: Some(plan.forecast_units),
                        risk_adjustment: Some(plan.risk_adjustment),
                        required_capacity: Some(plan.required_capacity),
                        full_time: Some(plan.full_time),
                        part_time: Some(plan.part_time),
                        overtime_hours: Some(plan.overtime_hours),
                        total_capacity: Some(plan.total_capacity),
                        total_cost: Some(plan.total_cost),
                        binding: plan
                            .constraints
                            .iter()
                            .filter(|c| c.binding)
                            .map(|c| c.constraint.to_string())
                            .collect::<Vec<_>>()
                            .join(";"),
                        error: None,
                    },
                    Err(e) => PlanRecord {
                        region: region.clone(),
                        week: week.to_string(),
                        status: e.kind().to_string(),
                        forecast_units: self.demand.get(&key).copied(),
                        risk_adjustment: risk.map(|r| r.factor),
                        required_capacity: match e {
                            StaffingError::Infeasible { required, .. } => Some(*required),
                            _ => None,
                        },
                        full_time: None,
                        part_time: None,
                        overtime_hours: None,
                        total_capacity: None,
                        total_cost: None,
                        binding: String::new(),
                        error: Some(e.to_string()),
                    },
                }
            })
            .collect()
    }

    pub fn failure_records(&self) -> Vec<FailureRecord> {
        self.failures
            .values()
            .map(|f| FailureRecord {
                shipment_id: f.shipment_id.clone(),
                kind: f.error.kind().to_string(),
                message: f.error.to_string(),
            })
            .collect()
    }

    /// Whole report as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        let doc = ReportDocument {
            attributed: self.attributed,
            failed: self.failures.len(),
            drivers: self.drivers.values().collect(),
            risk: self.risk.values().collect(),
            plans: self.plan_records(),
            failures: self.failure_records(),
        };
        serde_json::to_string_pretty(&doc)
    }
}

/// One ranked bucket of one (dimension, key, week) group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverRecord {
    pub dimension: String,
    pub key: String,
    pub week: String,
    pub shipments: usize,
    pub rank: usize,
    pub bucket: String,
    pub total_delay_days: f64,
    pub mean_delay_days: f64,
}

/// One (region, week) staffing outcome; failures carry `status` and `error`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanRecord {
    pub region: String,
    pub week: String,
    pub status: String,
    pub forecast_units: Option<f64>,
    pub risk_adjustment: Option<f64>,
    pub required_capacity: Option<f64>,
    pub full_time: Option<u32>,
    pub part_time: Option<u32>,
    pub overtime_hours: Option<f64>,
    pub total_capacity: Option<f64>,
    pub total_cost: Option<f64>,
    /// `;`-separated binding constraints
    pub binding: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureRecord {
    pub shipment_id: String,
    pub kind: String,
    pub message: String,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    attributed: usize,
    failed: usize,
    drivers: Vec<&'a DriverRanking>,
    risk: Vec<&'a RiskAssessment>,
    plans: Vec<PlanRecord>,
    failures: Vec<FailureRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttributionError;
    use crate::models::{ConstraintStatus, DelayBucket, DriverContribution, PlanConstraint};

    fn wk(s: &str) -> WeekKey {
        s.parse().unwrap()
    }

    fn ranking(dimension: GroupBy, key: &str, week: &str) -> DriverRanking {
        DriverRanking {
            dimension,
            key: key.into(),
            week: wk(week),
            shipments: 3,
            drivers: vec![
                DriverContribution {
                    bucket: DelayBucket::CutoffMiss,
                    rank: 1,
                    total_delay_days: 1.5,
                    mean_delay_days: 0.5,
                },
                DriverContribution {
                    bucket: DelayBucket::Unexplained,
                    rank: 2,
                    total_delay_days: -0.3,
                    mean_delay_days: -0.1,
                },
            ],
        }
    }

    fn plan(region: &str, week: &str) -> WorkforcePlan {
        WorkforcePlan {
            region: region.into(),
            week: wk(week),
            full_time: 12,
            part_time: 0,
            overtime_hours: 0.0,
            forecast_units: 100.0,
            risk_adjustment: 1.2,
            required_capacity: 120.0,
            total_capacity: 120.0,
            total_cost: 1200.0,
            constraints: vec![
                ConstraintStatus { constraint: PlanConstraint::Capacity, binding: true, slack: 0.0 },
                ConstraintStatus { constraint: PlanConstraint::MaxFullTime, binding: false, slack: 3.0 },
            ],
        }
    }

    fn failure(id: &str) -> AttributionFailure {
        AttributionFailure {
            shipment_id: id.into(),
            error: AttributionError::IncompleteShipment { shipment_id: id.into(), recorded: 1 },
        }
    }

    fn partial(region: &str, shipment: &str) -> AnalyticsReport {
        let mut r = AnalyticsReport::new();
        r.attributed = 10;
        r.add_rankings(vec![ranking(GroupBy::Region, region, "2024-W10")]).unwrap();
        let mut outcomes = PlanOutcomes::new();
        outcomes.insert((region.to_string(), wk("2024-W11")), Ok(plan(region, "2024-W11")));
        r.add_demand(&[StaffingRequest::new(region, wk("2024-W11"), 100.0, 1.2)]).unwrap();
        r.add_plans(outcomes).unwrap();
        r.add_failures(vec![failure(shipment)]).unwrap();
        r
    }

    #[test]
    fn test_merge_is_order_independent() {
        let ab = partial("EU", "s1").merge(partial("US", "s2")).unwrap();
        let ba = partial("US", "s2").merge(partial("EU", "s1")).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.attributed, 20);
        assert_eq!(ab.plan_records().len(), 2);
        assert_eq!(ab.failure_records()[0].shipment_id, "s1");
    }

    #[test]
    fn test_merge_rejects_overlapping_keys() {
        let err = partial("EU", "s1").merge(partial("EU", "s9")).unwrap_err();
        assert!(matches!(err, AggregationError::DuplicateKey(_)));
    }

    #[test]
    fn test_failed_instances_are_flagged_not_substituted() {
        let mut r = AnalyticsReport::new();
        let mut outcomes = PlanOutcomes::new();
        outcomes.insert(
            ("EU".to_string(), wk("2024-W11")),
            Err(StaffingError::Infeasible {
                region: "EU".into(),
                week: wk("2024-W11"),
                required: 151.0,
                reachable: 150.0,
            }),
        );
        outcomes.insert(("US".to_string(), wk("2024-W11")), Ok(plan("US", "2024-W11")));
        r.add_demand(&[
            StaffingRequest::new("EU", wk("2024-W11"), 125.8, 1.2),
            StaffingRequest::new("US", wk("2024-W11"), 100.0, 1.2),
        ])
        .unwrap();
        r.add_plans(outcomes).unwrap();

        let records = r.plan_records();
        assert_eq!(records[0].status, "infeasible");
        assert_eq!(records[0].forecast_units, Some(125.8));
        assert_eq!(records[0].full_time, None);
        assert_eq!(records[0].required_capacity, Some(151.0));
        assert!(records[0].error.as_deref().unwrap_or("").contains("151"));
        assert_eq!(records[1].status, "optimal");
        assert_eq!(records[1].binding, "capacity");
        assert_eq!(r.planned().count(), 1);
    }

    #[test]
    fn test_failed_instance_without_request_has_no_forecast() {
        let mut r = AnalyticsReport::new();
        let mut outcomes = PlanOutcomes::new();
        outcomes.insert(
            ("EU".to_string(), wk("2024-W12")),
            Err(StaffingError::InvalidConstraint {
                region: "EU".into(),
                week: wk("2024-W12"),
                message: "capacity_per_full_time must be positive".into(),
            }),
        );
        r.add_plans(outcomes).unwrap();
        let records = r.plan_records();
        assert_eq!(records[0].status, "invalid_constraint");
        assert_eq!(records[0].forecast_units, None);
    }

    #[test]
    fn test_driver_records_flatten_rankings() {
        let mut r = AnalyticsReport::new();
        r.add_rankings(vec![
            ranking(GroupBy::Lane, "W1-S001", "2024-W10"),
            ranking(GroupBy::Region, "EU", "2024-W10"),
        ])
        .unwrap();
        let rows = r.driver_records();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].dimension, "lane");
        assert_eq!(rows[0].bucket, "cutoff_miss");
        assert_eq!(rows[3].rank, 2);
        assert_eq!(r.rankings(GroupBy::Region).count(), 1);
    }

    #[test]
    fn test_json_report_contains_sections() {
        let json = partial("EU", "s1").to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["attributed"], 10);
        assert_eq!(value["drivers"][0]["week"], "2024-W10");
        assert_eq!(value["plans"][0]["status"], "optimal");
        assert_eq!(value["failures"][0]["kind"], "incomplete_shipment");
    }
}
