//! Capacity Optimization Engine
//!
//! One small mixed-integer program per (region, week): integer full-time and
//! part-time headcount plus continuous overtime hours, minimum cost first,
//! then least overtime, then least part-time headcount.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{StaffingConfig, StaffingConstraints};
use crate::error::StaffingError;
use crate::models::{ConstraintStatus, PlanConstraint, WeekKey, WorkforcePlan};
use crate::solver::{BranchAndBound, LinearExpr, Problem, Relation, Solver, VarKind};

/// Tolerance used for feasibility and binding checks, relative to required capacity
const CAPACITY_TOL: f64 = 1e-7;

/// Overtime below this many hours is reported as zero
const OVERTIME_EPS: f64 = 1e-6;

/// One staffing instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaffingRequest {
    pub region: String,
    pub week: WeekKey,
    /// Point forecast of work-units
    pub forecast_units: f64,
    /// Multiplicative buffer, >= 1.0
    pub risk_adjustment: f64,
}

impl StaffingRequest {
    pub fn new(region: impl Into<String>, week: WeekKey, forecast_units: f64, risk_adjustment: f64) -> Self {
        Self {
            region: region.into(),
            week,
            forecast_units,
            risk_adjustment,
        }
    }

    pub fn required_capacity(&self, constraints: &StaffingConstraints) -> f64 {
        self.forecast_units * self.risk_adjustment * constraints.min_service_level
    }
}

/// Keyed outcome of a batch of staffing instances
pub type PlanOutcomes = BTreeMap<(String, WeekKey), Result<WorkforcePlan, StaffingError>>;

fn check_constraints(request: &StaffingRequest, c: &StaffingConstraints) -> Result<(), String> {
    let fields = [
        ("max_full_time", c.max_full_time),
        ("max_part_time", c.max_part_time),
        ("max_overtime_hours", c.max_overtime_hours),
        ("cost_per_full_time", c.cost_per_full_time),
        ("cost_per_part_time", c.cost_per_part_time),
        ("cost_per_overtime_hour", c.cost_per_overtime_hour),
        ("capacity_per_full_time", c.capacity_per_full_time),
        ("capacity_per_part_time", c.capacity_per_part_time),
        ("capacity_per_overtime_hour", c.capacity_per_overtime_hour),
    ];
    for (name, value) in fields {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{} must be finite and >= 0, got {}", name, value));
        }
    }
    for (name, value) in [("max_full_time", c.max_full_time), ("max_part_time", c.max_part_time)] {
        if value.fract() != 0.0 {
            return Err(format!("{} must be a whole headcount, got {}", name, value));
        }
    }
    if !(c.min_service_level > 0.0 && c.min_service_level <= 1.0) {
        return Err(format!("min_service_level must be in (0, 1], got {}", c.min_service_level));
    }
    if let Some(share) = c.max_overtime_share {
        if !(0.0..=1.0).contains(&share) {
            return Err(format!("max_overtime_share must be in [0, 1], got {}", share));
        }
    }
    if !request.forecast_units.is_finite() || request.forecast_units < 0.0 {
        return Err(format!("forecast_units must be finite and >= 0, got {}", request.forecast_units));
    }
    if !request.risk_adjustment.is_finite() || request.risk_adjustment < 1.0 {
        return Err(format!("risk_adjustment must be finite and >= 1.0, got {}", request.risk_adjustment));
    }
    Ok(())
}

/// Overtime capacity usable for `required`, after the share policy
fn overtime_allowance(c: &StaffingConstraints, required: f64) -> f64 {
    let by_hours = c.max_overtime_hours * c.capacity_per_overtime_hour;
    match c.max_overtime_share {
        Some(share) => by_hours.min(share * required),
        None => by_hours,
    }
}

fn status(constraint: PlanConstraint, slack: f64, scale: f64) -> ConstraintStatus {
    ConstraintStatus {
        constraint,
        binding: slack.abs() <= CAPACITY_TOL * scale.max(1.0),
        slack,
    }
}

/// Staffing optimizer over any [`Solver`] backend
#[derive(Debug, Clone, Default)]
pub struct CapacityOptimizer<S: Solver = BranchAndBound> {
    solver: S,
}

impl CapacityOptimizer<BranchAndBound> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: Solver> CapacityOptimizer<S> {
    pub fn with_solver(solver: S) -> Self {
        Self { solver }
    }

    /// Minimum-cost plan for one (region, week).
    ///
    /// Never clips an infeasible demand to a partial plan: demand above what
    /// the maxima can reach is reported as [`StaffingError::Infeasible`].
    pub fn optimize(
        &self,
        request: &StaffingRequest,
        constraints: &StaffingConstraints,
    ) -> Result<WorkforcePlan, StaffingError> {
        let region = request.region.clone();
        let week = request.week;

        check_constraints(request, constraints).map_err(|message| StaffingError::InvalidConstraint {
            region: region.clone(),
            week,
            message,
        })?;

        let c = constraints;
        let required = request.required_capacity(c);
        let reachable = c.max_full_time * c.capacity_per_full_time
            + c.max_part_time * c.capacity_per_part_time
            + overtime_allowance(c, required);
        let tol = CAPACITY_TOL * required.max(1.0);
        if required > reachable + tol {
            return Err(StaffingError::Infeasible {
                region,
                week,
                required,
                reachable,
            });
        }
        let target = required.min(reachable);

        let mut problem = Problem::new();
        let ft = problem.add_variable("full_time", 0.0, c.max_full_time, VarKind::Integer);
        let pt = problem.add_variable("part_time", 0.0, c.max_part_time, VarKind::Integer);
        let ot = problem.add_variable("overtime_hours", 0.0, c.max_overtime_hours, VarKind::Continuous);

        let capacity = LinearExpr::new()
            .term(ft, c.capacity_per_full_time)
            .term(pt, c.capacity_per_part_time)
            .term(ot, c.capacity_per_overtime_hour);
        problem.add_constraint("capacity", capacity.clone(), Relation::GreaterEq, target);
        if let Some(share) = c.max_overtime_share {
            problem.add_constraint(
                "overtime_share",
                LinearExpr::new().term(ot, c.capacity_per_overtime_hour),
                Relation::LessEq,
                share * required,
            );
        }

        let cost = LinearExpr::new()
            .term(ft, c.cost_per_full_time)
            .term(pt, c.cost_per_part_time)
            .term(ot, c.cost_per_overtime_hour);
        problem.minimize(cost.clone());
        problem.minimize(LinearExpr::new().term(ot, 1.0));
        problem.minimize(LinearExpr::new().term(pt, 1.0));

        let solution = self.solver.solve(&problem).map_err(|source| StaffingError::Solver {
            region: region.clone(),
            week,
            source,
        })?;

        let full_time = solution.value(ft).round();
        let part_time = solution.value(pt).round();
        let mut overtime_hours = solution.value(ot);
        if overtime_hours < OVERTIME_EPS {
            overtime_hours = 0.0;
        }
        let values = [full_time, part_time, overtime_hours];
        let total_capacity = capacity.evaluate(&values);
        let total_cost = cost.evaluate(&values);

        let mut statuses = vec![
            status(PlanConstraint::Capacity, total_capacity - required, required),
            status(PlanConstraint::MaxFullTime, c.max_full_time - full_time, c.max_full_time),
            status(PlanConstraint::MaxPartTime, c.max_part_time - part_time, c.max_part_time),
            status(
                PlanConstraint::MaxOvertimeHours,
                c.max_overtime_hours - overtime_hours,
                c.max_overtime_hours,
            ),
        ];
        if let Some(share) = c.max_overtime_share {
            statuses.push(status(
                PlanConstraint::OvertimeShare,
                share * required - c.capacity_per_overtime_hour * overtime_hours,
                required,
            ));
        }

        debug!(
            region = %region,
            %week,
            full_time,
            part_time,
            overtime_hours,
            total_cost,
            "Staffing plan solved"
        );

        Ok(WorkforcePlan {
            region,
            week,
            full_time: full_time as u32,
            part_time: part_time as u32,
            overtime_hours,
            forecast_units: request.forecast_units,
            risk_adjustment: request.risk_adjustment,
            required_capacity: required,
            total_capacity,
            total_cost,
            constraints: statuses,
        })
    }

    /// Solve every request independently and in parallel.
    ///
    /// A failing instance is kept in the map as an error and never aborts
    /// its siblings.
    pub fn plan_all(&self, requests: &[StaffingRequest], config: &StaffingConfig) -> PlanOutcomes {
        let outcomes: PlanOutcomes = requests
            .par_iter()
            .map(|r| {
                let outcome = self.optimize(r, config.constraints_for(&r.region));
                if let Err(e) = &outcome {
                    warn!(kind = e.kind(), "{}", e);
                }
                ((r.region.clone(), r.week), outcome)
            })
            .collect();

        let failed = outcomes.values().filter(|o| o.is_err()).count();
        info!(
            instances = outcomes.len(),
            planned = outcomes.len() - failed,
            failed,
            "Staffing optimisation complete"
        );
        outcomes
    }
}

/// Solve one instance with the built-in backend
pub fn optimize(request: &StaffingRequest, constraints: &StaffingConstraints) -> Result<WorkforcePlan, StaffingError> {
    CapacityOptimizer::new().optimize(request, constraints)
}
