//! Error taxonomy for both engines and the configuration layer

use thiserror::Error;

use crate::models::{LaneType, MilestoneType, WeekKey};
use crate::solver::SolveError;

/// Data-integrity failures for a single shipment.
///
/// Collected per shipment; never aborts a batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttributionError {
    #[error("shipment {shipment_id}: only {recorded} milestone(s) recorded, at least 2 required")]
    IncompleteShipment { shipment_id: String, recorded: usize },

    #[error("shipment {shipment_id}: {later} at {later_at} precedes {earlier} at {earlier_at}")]
    InvalidOrdering {
        shipment_id: String,
        earlier: MilestoneType,
        earlier_at: String,
        later: MilestoneType,
        later_at: String,
    },

    #[error("shipment {shipment_id}: unknown lane {lane_id}")]
    UnknownLane { shipment_id: String, lane_id: String },

    #[error("shipment {shipment_id}: milestone {milestone} is duplicated or not part of the {lane_type} sequence")]
    UnexpectedMilestone {
        shipment_id: String,
        milestone: MilestoneType,
        lane_type: LaneType,
    },

    #[error("shipment {shipment_id}: no lane profile configured for {lane_type}")]
    UnconfiguredLaneType { shipment_id: String, lane_type: LaneType },

    /// A shipment or milestone row that could not be parsed at load
    #[error("malformed input row: {message}")]
    MalformedRecord { shipment_id: String, message: String },
}

impl AttributionError {
    pub fn kind(&self) -> &'static str {
        match self {
            AttributionError::IncompleteShipment { .. } => "incomplete_shipment",
            AttributionError::InvalidOrdering { .. } => "invalid_ordering",
            AttributionError::UnknownLane { .. } => "unknown_lane",
            AttributionError::UnexpectedMilestone { .. } => "unexpected_milestone",
            AttributionError::UnconfiguredLaneType { .. } => "unconfigured_lane_type",
            AttributionError::MalformedRecord { .. } => "malformed_record",
        }
    }
}

/// Failures of one (region, week) staffing instance
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StaffingError {
    #[error("{region} {week}: required capacity {required:.2} exceeds reachable capacity {reachable:.2}")]
    Infeasible {
        region: String,
        week: WeekKey,
        required: f64,
        reachable: f64,
    },

    #[error("{region} {week}: invalid constraint: {message}")]
    InvalidConstraint {
        region: String,
        week: WeekKey,
        message: String,
    },

    #[error("{region} {week}: solver failed: {source}")]
    Solver {
        region: String,
        week: WeekKey,
        #[source]
        source: SolveError,
    },
}

impl StaffingError {
    pub fn kind(&self) -> &'static str {
        match self {
            StaffingError::Infeasible { .. } => "infeasible",
            StaffingError::InvalidConstraint { .. } => "invalid_constraint",
            StaffingError::Solver { .. } => "solver_error",
        }
    }
}

/// Load-time configuration failures. Fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("duplicate report key {0}")]
    DuplicateKey(String),
}
