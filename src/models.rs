use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

/// Timestamp format used by every CSV table
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn parse_timestamp(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .with_context(|| format!("invalid timestamp '{}'", s))
}

pub fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Signed difference `to - from` in fractional days
pub fn days_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / 86_400_000.0
}

// ============================================================================
// Network
// ============================================================================

/// Network echelon a lane starts or ends at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Factory,
    Warehouse,
    Store,
}

/// Lane type, which fixes the milestone sequence and delay buckets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LaneType {
    #[serde(rename = "F2W")]
    FactoryToWarehouse,
    #[serde(rename = "W2S")]
    WarehouseToStore,
}

impl LaneType {
    pub const ALL: [LaneType; 2] = [LaneType::FactoryToWarehouse, LaneType::WarehouseToStore];

    pub fn as_str(&self) -> &'static str {
        match self {
            LaneType::FactoryToWarehouse => "F2W",
            LaneType::WarehouseToStore => "W2S",
        }
    }

    pub fn origin(&self) -> NodeType {
        match self {
            LaneType::FactoryToWarehouse => NodeType::Factory,
            LaneType::WarehouseToStore => NodeType::Warehouse,
        }
    }

    pub fn destination(&self) -> NodeType {
        match self {
            LaneType::FactoryToWarehouse => NodeType::Warehouse,
            LaneType::WarehouseToStore => NodeType::Store,
        }
    }
}

impl fmt::Display for LaneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LaneType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "F2W" => Ok(LaneType::FactoryToWarehouse),
            "W2S" => Ok(LaneType::WarehouseToStore),
            other => bail!("unknown lane type '{}'", other),
        }
    }
}

/// Directed edge of the shipment network
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lane {
    pub lane_id: String,
    pub lane_type: LaneType,
    pub origin_type: NodeType,
    pub origin_id: String,
    pub destination_type: NodeType,
    pub destination_id: String,
    /// Region served by the destination node
    pub region: String,
    pub mode: String,
    /// Contractual transit target, always > 0
    pub sla_days: f64,
}

// ============================================================================
// Shipments and milestones
// ============================================================================

/// Operational checkpoint on a shipment's journey
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneType {
    OrderRelease,
    ExportClearance,
    InTransit,
    ImportClearance,
    WarehouseReceived,
    PickStart,
    PickComplete,
    PackComplete,
    Dispatch,
    StoreReceived,
}

impl MilestoneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneType::OrderRelease => "order_release",
            MilestoneType::ExportClearance => "export_clearance",
            MilestoneType::InTransit => "in_transit",
            MilestoneType::ImportClearance => "import_clearance",
            MilestoneType::WarehouseReceived => "warehouse_received",
            MilestoneType::PickStart => "pick_start",
            MilestoneType::PickComplete => "pick_complete",
            MilestoneType::PackComplete => "pack_complete",
            MilestoneType::Dispatch => "dispatch",
            MilestoneType::StoreReceived => "store_received",
        }
    }

    /// Lane type this checkpoint belongs to
    pub fn lane_type(&self) -> LaneType {
        match self {
            MilestoneType::OrderRelease
            | MilestoneType::ExportClearance
            | MilestoneType::InTransit
            | MilestoneType::ImportClearance
            | MilestoneType::WarehouseReceived => LaneType::FactoryToWarehouse,
            MilestoneType::PickStart
            | MilestoneType::PickComplete
            | MilestoneType::PackComplete
            | MilestoneType::Dispatch
            | MilestoneType::StoreReceived => LaneType::WarehouseToStore,
        }
    }
}

impl fmt::Display for MilestoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MilestoneType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let m = match s.trim() {
            "order_release" => MilestoneType::OrderRelease,
            "export_clearance" => MilestoneType::ExportClearance,
            "in_transit" => MilestoneType::InTransit,
            "import_clearance" => MilestoneType::ImportClearance,
            "warehouse_received" => MilestoneType::WarehouseReceived,
            "pick_start" => MilestoneType::PickStart,
            "pick_complete" => MilestoneType::PickComplete,
            "pack_complete" => MilestoneType::PackComplete,
            "dispatch" => MilestoneType::Dispatch,
            "store_received" => MilestoneType::StoreReceived,
            other => bail!("unknown milestone '{}'", other),
        };
        Ok(m)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MilestoneEvent {
    pub milestone: MilestoneType,
    pub timestamp: NaiveDateTime,
}

/// One physical movement along one lane. Historical and immutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shipment {
    pub shipment_id: String,
    pub lane_id: String,
    pub sku_id: String,
    pub planned_ship: NaiveDateTime,
    /// Recorded events in any order; the lane profile decides sequencing
    pub milestones: Vec<MilestoneEvent>,
}

// ============================================================================
// Attribution outputs
// ============================================================================

/// Causal delay category. Declaration order is the ranking tie-break order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DelayBucket {
    ExportDelay,
    TransitDelay,
    ImportCongestion,
    PickingBottleneck,
    PackingBottleneck,
    CutoffMiss,
    Unexplained,
}

impl DelayBucket {
    pub const ALL: [DelayBucket; 7] = [
        DelayBucket::ExportDelay,
        DelayBucket::TransitDelay,
        DelayBucket::ImportCongestion,
        DelayBucket::PickingBottleneck,
        DelayBucket::PackingBottleneck,
        DelayBucket::CutoffMiss,
        DelayBucket::Unexplained,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DelayBucket::ExportDelay => "export_delay",
            DelayBucket::TransitDelay => "transit_delay",
            DelayBucket::ImportCongestion => "import_congestion",
            DelayBucket::PickingBottleneck => "picking_bottleneck",
            DelayBucket::PackingBottleneck => "packing_bottleneck",
            DelayBucket::CutoffMiss => "cutoff_miss",
            DelayBucket::Unexplained => "unexplained",
        }
    }
}

impl fmt::Display for DelayBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ISO calendar week
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekKey {
    pub year: i32,
    pub week: u32,
}

impl WeekKey {
    pub fn new(year: i32, week: u32) -> Option<Self> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).map(|_| WeekKey { year, week })
    }

    pub fn of(dt: &NaiveDateTime) -> Self {
        let iso = dt.iso_week();
        WeekKey { year: iso.year(), week: iso.week() }
    }

    /// Monday of this week
    pub fn start(&self) -> Option<NaiveDate> {
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)
    }

    pub fn next(&self) -> Option<Self> {
        let next_monday = self.start()? + Duration::days(7);
        let iso = next_monday.iso_week();
        Some(WeekKey { year: iso.year(), week: iso.week() })
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

impl FromStr for WeekKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (year, week) = s
            .split_once("-W")
            .with_context(|| format!("week '{}' is not in YYYY-Www form", s))?;
        let year: i32 = year.parse().with_context(|| format!("invalid year in '{}'", s))?;
        let week: u32 = week.parse().with_context(|| format!("invalid week in '{}'", s))?;
        WeekKey::new(year, week).with_context(|| format!("week '{}' does not exist", s))
    }
}

impl TryFrom<String> for WeekKey {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WeekKey> for String {
    fn from(value: WeekKey) -> Self {
        value.to_string()
    }
}

/// Per-shipment delay decomposition.
///
/// The signed sum of `buckets` equals `total_delay_days`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelayAttribution {
    pub shipment_id: String,
    pub lane_id: String,
    pub lane_type: LaneType,
    pub region: String,
    /// Timestamp of the last recorded milestone
    pub completed_at: NaiveDateTime,
    pub week: WeekKey,
    /// Terminal milestone of the sequence was recorded
    pub delivered: bool,
    pub total_delay_days: f64,
    pub buckets: BTreeMap<DelayBucket, f64>,
    /// Intermediate milestones absent from the record
    pub missing_milestones: Vec<MilestoneType>,
}

impl DelayAttribution {
    pub fn bucket(&self, bucket: DelayBucket) -> f64 {
        self.buckets.get(&bucket).copied().unwrap_or(0.0)
    }

    pub fn bucket_sum(&self) -> f64 {
        self.buckets.values().sum()
    }
}

/// Dimension a driver ranking is grouped by
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Lane,
    Region,
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupBy::Lane => f.write_str("lane"),
            GroupBy::Region => f.write_str("region"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverContribution {
    pub bucket: DelayBucket,
    /// 1-based
    pub rank: usize,
    pub total_delay_days: f64,
    pub mean_delay_days: f64,
}

/// Ranked delay drivers for one (lane or region, week)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverRanking {
    pub dimension: GroupBy,
    pub key: String,
    pub week: WeekKey,
    pub shipments: usize,
    pub drivers: Vec<DriverContribution>,
}

impl DriverRanking {
    pub fn contribution(&self, bucket: DelayBucket) -> Option<&DriverContribution> {
        self.drivers.iter().find(|d| d.bucket == bucket)
    }

    /// Keep only the first `n` drivers, preserving rank order
    pub fn top(&self, n: usize) -> DriverRanking {
        DriverRanking {
            drivers: self.drivers.iter().take(n).cloned().collect(),
            ..self.clone()
        }
    }
}

// ============================================================================
// Staffing outputs
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlanConstraint {
    Capacity,
    MaxFullTime,
    MaxPartTime,
    MaxOvertimeHours,
    OvertimeShare,
}

impl fmt::Display for PlanConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanConstraint::Capacity => "capacity",
            PlanConstraint::MaxFullTime => "max_full_time",
            PlanConstraint::MaxPartTime => "max_part_time",
            PlanConstraint::MaxOvertimeHours => "max_overtime_hours",
            PlanConstraint::OvertimeShare => "overtime_share",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstraintStatus {
    pub constraint: PlanConstraint,
    pub binding: bool,
    pub slack: f64,
}

/// Minimum-cost staffing for one (region, week)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkforcePlan {
    pub region: String,
    pub week: WeekKey,
    pub full_time: u32,
    pub part_time: u32,
    pub overtime_hours: f64,
    pub forecast_units: f64,
    pub risk_adjustment: f64,
    pub required_capacity: f64,
    pub total_capacity: f64,
    pub total_cost: f64,
    pub constraints: Vec<ConstraintStatus>,
}

impl WorkforcePlan {
    pub fn is_binding(&self, constraint: PlanConstraint) -> bool {
        self.constraints
            .iter()
            .any(|c| c.constraint == constraint && c.binding)
    }
}

// ============================================================================
// CSV records
// ============================================================================

/// Raw row of lanes.csv
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneRecord {
    pub lane_id: String,
    pub lane_type: String,
    pub origin_type: NodeType,
    pub origin_id: String,
    pub destination_type: NodeType,
    pub destination_id: String,
    pub region: String,
    pub mode: String,
    pub sla_days: f64,
}

impl LaneRecord {
    pub fn to_lane(&self) -> anyhow::Result<Lane> {
        let lane_type: LaneType = self.lane_type.parse()?;
        if !(self.sla_days.is_finite() && self.sla_days > 0.0) {
            bail!("lane {} has non-positive sla_days {}", self.lane_id, self.sla_days);
        }
        if self.origin_type != lane_type.origin() || self.destination_type != lane_type.destination() {
            bail!(
                "lane {} endpoints {:?}->{:?} do not match lane type {}",
                self.lane_id,
                self.origin_type,
                self.destination_type,
                lane_type
            );
        }
        Ok(Lane {
            lane_id: self.lane_id.clone(),
            lane_type,
            origin_type: self.origin_type,
            origin_id: self.origin_id.clone(),
            destination_type: self.destination_type,
            destination_id: self.destination_id.clone(),
            region: self.region.clone(),
            mode: self.mode.clone(),
            sla_days: self.sla_days,
        })
    }
}

impl From<&Lane> for LaneRecord {
    fn from(lane: &Lane) -> Self {
        LaneRecord {
            lane_id: lane.lane_id.clone(),
            lane_type: lane.lane_type.as_str().to_string(),
            origin_type: lane.origin_type,
            origin_id: lane.origin_id.clone(),
            destination_type: lane.destination_type,
            destination_id: lane.destination_id.clone(),
            region: lane.region.clone(),
            mode: lane.mode.clone(),
            sla_days: lane.sla_days,
        }
    }
}

/// Raw row of shipments.csv
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentRecord {
    pub shipment_id: String,
    pub lane_id: String,
    pub sku_id: String,
    pub planned_ship: String,
}

impl ShipmentRecord {
    /// Shipment without milestones; these are joined in from milestones.csv
    pub fn to_shipment(&self) -> anyhow::Result<Shipment> {
        let planned_ship = parse_timestamp(&self.planned_ship)
            .with_context(|| format!("shipment {}", self.shipment_id))?;
        Ok(Shipment {
            shipment_id: self.shipment_id.clone(),
            lane_id: self.lane_id.clone(),
            sku_id: self.sku_id.clone(),
            planned_ship,
            milestones: Vec::new(),
        })
    }
}

/// Raw row of milestones.csv
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneRecord {
    pub shipment_id: String,
    pub milestone: String,
    pub timestamp: String,
}

impl MilestoneRecord {
    pub fn to_event(&self) -> anyhow::Result<MilestoneEvent> {
        let milestone: MilestoneType = self
            .milestone
            .parse()
            .with_context(|| format!("shipment {}", self.shipment_id))?;
        let timestamp = parse_timestamp(&self.timestamp)
            .with_context(|| format!("shipment {} milestone {}", self.shipment_id, milestone))?;
        Ok(MilestoneEvent { milestone, timestamp })
    }
}

/// Raw row of forecast.csv
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub region: String,
    pub week: String,
    pub forecast_units: f64,
    pub mape: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_days_between_is_signed() {
        let a = ts("2024-01-01 00:00:00");
        let b = ts("2024-01-02 12:00:00");
        assert_eq!(days_between(a, b), 1.5);
        assert_eq!(days_between(b, a), -1.5);
    }

    #[test]
    fn test_week_key_roundtrip_and_rollover() {
        let wk: WeekKey = "2024-W52".parse().unwrap();
        assert_eq!(wk.to_string(), "2024-W52");
        assert_eq!(wk.next().unwrap().to_string(), "2025-W01");
        assert!("2024-W54".parse::<WeekKey>().is_err());
        assert!("2024-05".parse::<WeekKey>().is_err());
    }

    #[test]
    fn test_week_of_timestamp_uses_iso_calendar() {
        // 2024-12-30 is a Monday in ISO week 2025-W01
        assert_eq!(WeekKey::of(&ts("2024-12-30 08:00:00")).to_string(), "2025-W01");
    }

    #[test]
    fn test_lane_record_rejects_non_positive_sla() {
        let rec = LaneRecord {
            lane_id: "L1".into(),
            lane_type: "W2S".into(),
            origin_type: NodeType::Warehouse,
            origin_id: "W1".into(),
            destination_type: NodeType::Store,
            destination_id: "S001".into(),
            region: "EU".into(),
            mode: "ROAD".into(),
            sla_days: 0.0,
        };
        assert!(rec.to_lane().is_err());
        let ok = LaneRecord { sla_days: 1.25, ..rec };
        assert_eq!(ok.to_lane().unwrap().lane_type, LaneType::WarehouseToStore);
    }

    #[test]
    fn test_lane_record_rejects_mismatched_endpoints() {
        let rec = LaneRecord {
            lane_id: "L2".into(),
            lane_type: "F2W".into(),
            origin_type: NodeType::Warehouse,
            origin_id: "W1".into(),
            destination_type: NodeType::Store,
            destination_id: "S001".into(),
            region: "EU".into(),
            mode: "AIR".into(),
            sla_days: 3.0,
        };
        assert!(rec.to_lane().is_err());
    }

    #[test]
    fn test_milestone_names_parse() {
        for m in ["order_release", "pick_complete", "store_received"] {
            let parsed: MilestoneType = m.parse().unwrap();
            assert_eq!(parsed.as_str(), m);
        }
        assert!("loaded".parse::<MilestoneType>().is_err());
    }

    #[test]
    fn test_bucket_enumeration_order() {
        let mut sorted = DelayBucket::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, DelayBucket::ALL.to_vec());
        assert_eq!(DelayBucket::ALL.last(), Some(&DelayBucket::Unexplained));
    }
}
