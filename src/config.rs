//! Externally supplied configuration: attribution lane profiles, risk
//! mapping and staffing constraints.
//!
//! Loaded from a single TOML document and validated once at startup. The
//! validated value is shared read-only by every attribution and staffing call.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::models::{DelayBucket, LaneType, MilestoneType};

// ============================================================================
// Attribution
// ============================================================================

/// Ordered milestone sequence for one lane type, with the expected
/// (baseline) timing of each milestone and the bucket owning each gap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaneProfile {
    pub lane_type: LaneType,
    pub milestones: Vec<MilestoneType>,
    /// Expected offset of each milestone from the first one, in days
    pub baseline_offsets_days: Vec<f64>,
    /// Bucket for the gap between milestone `i` and `i + 1`
    pub buckets: Vec<DelayBucket>,
}

impl LaneProfile {
    pub fn position(&self, milestone: MilestoneType) -> Option<usize> {
        self.milestones.iter().position(|m| *m == milestone)
    }

    pub fn expected_gap_days(&self, pair: usize) -> f64 {
        self.baseline_offsets_days[pair + 1] - self.baseline_offsets_days[pair]
    }

    pub fn bucket_for_pair(&self, pair: usize) -> DelayBucket {
        self.buckets[pair]
    }

    /// Buckets this lane type can attribute to, in enumeration order,
    /// always ending with `Unexplained`
    pub fn bucket_set(&self) -> Vec<DelayBucket> {
        let mut set: Vec<DelayBucket> = self.buckets.clone();
        set.push(DelayBucket::Unexplained);
        set.sort();
        set.dedup();
        set
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let lt = self.lane_type;
        let n = self.milestones.len();
        if n < 2 {
            return Err(invalid(format!("{} profile needs at least 2 milestones, got {}", lt, n)));
        }

        let mut seen = HashSet::new();
        for m in &self.milestones {
            if !seen.insert(*m) {
                return Err(invalid(format!("{} profile lists {} twice", lt, m)));
            }
            if m.lane_type() != lt {
                return Err(invalid(format!("{} profile contains {} milestone {}", lt, m.lane_type(), m)));
            }
        }

        if self.baseline_offsets_days.len() != n {
            return Err(invalid(format!(
                "{} baseline table has {} entries for {} milestones",
                lt,
                self.baseline_offsets_days.len(),
                n
            )));
        }
        if let Some(bad) = self.baseline_offsets_days.iter().find(|v| !v.is_finite()) {
            return Err(invalid(format!("{} baseline table contains non-finite offset {}", lt, bad)));
        }
        for (i, pair) in self.baseline_offsets_days.windows(2).enumerate() {
            if pair[1] < pair[0] {
                return Err(invalid(format!(
                    "{} baseline table is not monotonic: {} at {} precedes {} at {}",
                    lt,
                    self.milestones[i + 1],
                    pair[1],
                    self.milestones[i],
                    pair[0]
                )));
            }
        }

        if self.buckets.len() != n - 1 {
            return Err(invalid(format!(
                "{} bucket table has {} entries for {} milestone gaps",
                lt,
                self.buckets.len(),
                n - 1
            )));
        }
        if self.buckets.contains(&DelayBucket::Unexplained) {
            return Err(invalid(format!("{} bucket table maps a gap to the residual bucket", lt)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributionConfig {
    pub lanes: Vec<LaneProfile>,
}

impl AttributionConfig {
    pub fn profile(&self, lane_type: LaneType) -> Option<&LaneProfile> {
        self.lanes.iter().find(|p| p.lane_type == lane_type)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for lt in LaneType::ALL {
            let count = self.lanes.iter().filter(|p| p.lane_type == lt).count();
            match count {
                0 => return Err(invalid(format!("missing lane profile for {}", lt))),
                1 => {}
                _ => return Err(invalid(format!("{} lane profiles configured for {}", count, lt))),
            }
        }
        self.lanes.iter().try_for_each(LaneProfile::validate)
    }
}

impl Default for AttributionConfig {
    fn default() -> Self {
        // Planning durations of the reference network, in days
        Self {
            lanes: vec![
                LaneProfile {
                    lane_type: LaneType::FactoryToWarehouse,
                    milestones: vec![
                        MilestoneType::OrderRelease,
                        MilestoneType::ExportClearance,
                        MilestoneType::InTransit,
                        MilestoneType::ImportClearance,
                        MilestoneType::WarehouseReceived,
                    ],
                    baseline_offsets_days: vec![0.0, 0.35, 0.6, 1.1, 1.6],
                    buckets: vec![
                        DelayBucket::ExportDelay,
                        DelayBucket::TransitDelay,
                        DelayBucket::ImportCongestion,
                        DelayBucket::ImportCongestion,
                    ],
                },
                LaneProfile {
                    lane_type: LaneType::WarehouseToStore,
                    milestones: vec![
                        MilestoneType::PickStart,
                        MilestoneType::PickComplete,
                        MilestoneType::PackComplete,
                        MilestoneType::Dispatch,
                        MilestoneType::StoreReceived,
                    ],
                    baseline_offsets_days: vec![0.0, 0.04, 0.1, 0.2, 0.95],
                    buckets: vec![
                        DelayBucket::PickingBottleneck,
                        DelayBucket::PackingBottleneck,
                        DelayBucket::CutoffMiss,
                        DelayBucket::TransitDelay,
                    ],
                },
            ],
        }
    }
}

// ============================================================================
// Risk adjustment
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskStatistic {
    /// Mean delay per shipment in scope
    Mean,
    /// Summed delay across shipments in scope
    Total,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RiskBreakpoint {
    pub delay_days: f64,
    pub factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskConfig {
    /// Buckets whose attributed delay drives the capacity buffer
    pub buckets: Vec<DelayBucket>,
    pub statistic: RiskStatistic,
    /// Piecewise-linear signal -> factor mapping
    pub breakpoints: Vec<RiskBreakpoint>,
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buckets.is_empty() {
            return Err(invalid("risk mapping names no buckets"));
        }
        if self.breakpoints.is_empty() {
            return Err(invalid("risk mapping has no breakpoints"));
        }
        for bp in &self.breakpoints {
            if !bp.delay_days.is_finite() || !bp.factor.is_finite() {
                return Err(invalid("risk mapping contains a non-finite breakpoint"));
            }
            if bp.factor < 1.0 {
                return Err(invalid(format!("risk factor {} is below 1.0", bp.factor)));
            }
        }
        for pair in self.breakpoints.windows(2) {
            if pair[1].delay_days <= pair[0].delay_days {
                return Err(invalid("risk breakpoints must have strictly increasing delay_days"));
            }
            if pair[1].factor < pair[0].factor {
                return Err(invalid("risk mapping is not monotonic"));
            }
        }
        Ok(())
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            buckets: vec![DelayBucket::PickingBottleneck, DelayBucket::CutoffMiss],
            statistic: RiskStatistic::Mean,
            breakpoints: vec![
                RiskBreakpoint { delay_days: 0.0, factor: 1.0 },
                RiskBreakpoint { delay_days: 0.1, factor: 1.05 },
                RiskBreakpoint { delay_days: 0.5, factor: 1.2 },
                RiskBreakpoint { delay_days: 1.0, factor: 1.35 },
            ],
        }
    }
}

// ============================================================================
// Staffing
// ============================================================================

/// Cost, capacity and service-level bounds of one staffing instance.
///
/// Validated per instance by the optimizer, not at load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaffingConstraints {
    pub max_full_time: f64,
    pub max_part_time: f64,
    pub max_overtime_hours: f64,
    pub cost_per_full_time: f64,
    pub cost_per_part_time: f64,
    pub cost_per_overtime_hour: f64,
    pub capacity_per_full_time: f64,
    pub capacity_per_part_time: f64,
    pub capacity_per_overtime_hour: f64,
    pub min_service_level: f64,
    /// Share of required capacity overtime may cover at most. Off unless set.
    #[serde(default)]
    pub max_overtime_share: Option<f64>,
}

impl Default for StaffingConstraints {
    fn default() -> Self {
        Self {
            max_full_time: 40.0,
            max_part_time: 30.0,
            max_overtime_hours: 400.0,
            cost_per_full_time: 2200.0,
            cost_per_part_time: 1200.0,
            cost_per_overtime_hour: 90.0,
            capacity_per_full_time: 420.0,
            capacity_per_part_time: 180.0,
            capacity_per_overtime_hour: 10.0,
            min_service_level: 1.0,
            max_overtime_share: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StaffingConfig {
    #[serde(default)]
    pub default: StaffingConstraints,
    /// Per-region overrides of `default`
    #[serde(default)]
    pub regions: BTreeMap<String, StaffingConstraints>,
}

impl StaffingConfig {
    pub fn constraints_for(&self, region: &str) -> &StaffingConstraints {
        self.regions.get(region).unwrap_or(&self.default)
    }
}

// ============================================================================
// Top level
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub staffing: StaffingConfig,
}

impl AnalyticsConfig {
    /// Load and validate a TOML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.as_ref().display(), "Loaded analytics configuration");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AnalyticsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Use `path` when given, built-in defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                warn!("No configuration file given, using built-in defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.attribution.validate()?;
        self.risk.validate()?;
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::InvalidConfig(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        AnalyticsConfig::default().validate().unwrap();
    }

    #[test]
    fn test_missing_lane_profile_rejected() {
        let mut cfg = AttributionConfig::default();
        cfg.lanes.retain(|p| p.lane_type != LaneType::WarehouseToStore);
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(ref m) if m.contains("W2S")));
    }

    #[test]
    fn test_non_monotonic_baseline_rejected() {
        let mut cfg = AttributionConfig::default();
        cfg.lanes[0].baseline_offsets_days = vec![0.0, 0.5, 0.4, 1.0, 1.5];
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_short_baseline_table_rejected() {
        let mut cfg = AttributionConfig::default();
        cfg.lanes[1].baseline_offsets_days.pop();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_foreign_milestone_rejected() {
        let mut cfg = AttributionConfig::default();
        cfg.lanes[0].milestones[2] = MilestoneType::Dispatch;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_residual_bucket_cannot_be_mapped() {
        let mut cfg = AttributionConfig::default();
        cfg.lanes[1].buckets[3] = DelayBucket::Unexplained;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_risk_mapping_must_be_monotonic() {
        let mut risk = RiskConfig::default();
        risk.breakpoints[2].factor = 1.01;
        assert!(risk.validate().is_err());

        let mut risk = RiskConfig::default();
        risk.breakpoints[0].factor = 0.9;
        assert!(risk.validate().is_err());
    }

    #[test]
    fn test_parse_toml_with_region_override() {
        let text = r#"
            [staffing.default]
            max_full_time = 15
            max_part_time = 0
            max_overtime_hours = 0
            cost_per_full_time = 100
            cost_per_part_time = 0
            cost_per_overtime_hour = 0
            capacity_per_full_time = 10
            capacity_per_part_time = 0
            capacity_per_overtime_hour = 0
            min_service_level = 1.0

            [staffing.regions.US]
            max_full_time = 20
            max_part_time = 5
            max_overtime_hours = 10
            cost_per_full_time = 120
            cost_per_part_time = 70
            cost_per_overtime_hour = 9
            capacity_per_full_time = 10
            capacity_per_part_time = 5
            capacity_per_overtime_hour = 1
            min_service_level = 0.95
            max_overtime_share = 0.1
        "#;
        let cfg = AnalyticsConfig::from_toml_str(text).unwrap();
        assert_eq!(cfg.staffing.constraints_for("EU").max_full_time, 15.0);
        assert_eq!(cfg.staffing.constraints_for("US").max_overtime_share, Some(0.1));
        assert_eq!(cfg.attribution, AttributionConfig::default());
    }

    #[test]
    fn test_toml_lane_profile_is_validated_on_load() {
        let text = r#"
            [[attribution.lanes]]
            lane_type = "F2W"
            milestones = ["order_release", "warehouse_received"]
            baseline_offsets_days = [0.0, 2.0]
            buckets = ["transit_delay"]
        "#;
        let err = AnalyticsConfig::from_toml_str(text).unwrap_err();
        assert!(err.to_string().contains("missing lane profile for W2S"));
    }

    #[test]
    fn test_omitted_overtime_share_matches_default() {
        let text = r#"
            [staffing.default]
            max_full_time = 40
            max_part_time = 30
            max_overtime_hours = 400
            cost_per_full_time = 2200
            cost_per_part_time = 1200
            cost_per_overtime_hour = 90
            capacity_per_full_time = 420
            capacity_per_part_time = 180
            capacity_per_overtime_hour = 10
            min_service_level = 1.0
        "#;
        let cfg = AnalyticsConfig::from_toml_str(text).unwrap();
        assert_eq!(cfg.staffing.default, StaffingConstraints::default());
        assert_eq!(cfg.staffing.default.max_overtime_share, None);
    }
}
