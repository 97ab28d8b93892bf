use tracing::{debug, trace};

use super::simplex::{self, LpOutcome, Row};
use super::{Problem, Relation, Solution, SolveError, Solver, VarKind};

/// Depth-first branch and bound over simplex LP relaxations.
///
/// Objectives are handled lexicographically: once a stage is solved its
/// objective is capped at the optimum (plus `objective_tol`, relative) for
/// all later stages. Among equal-valued candidates the first one reached in
/// the fixed search order (down branch before up branch, lowest variable
/// index branched first) is kept, so results do not depend on scheduling.
#[derive(Debug, Clone)]
pub struct BranchAndBound {
    pub max_nodes: usize,
    pub integrality_tol: f64,
    pub objective_tol: f64,
}

impl Default for BranchAndBound {
    fn default() -> Self {
        Self {
            max_nodes: 100_000,
            integrality_tol: 1e-6,
            objective_tol: 1e-9,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl BranchAndBound {
    fn tolerance(&self, value: f64) -> f64 {
        self.objective_tol * value.abs().max(1.0)
    }

    fn minimize(&self, problem: &Problem, rows: &[Row], cost: &[f64]) -> Result<(Vec<f64>, f64), SolveError> {
        let vars = problem.variables();
        let root = Node {
            lower: vars
                .iter()
                .map(|v| match v.kind {
                    VarKind::Integer => v.lower.ceil(),
                    VarKind::Continuous => v.lower,
                })
                .collect(),
            upper: vars
                .iter()
                .map(|v| match v.kind {
                    VarKind::Integer => v.upper.floor(),
                    VarKind::Continuous => v.upper,
                })
                .collect(),
        };

        let mut stack = vec![root];
        let mut best: Option<(Vec<f64>, f64)> = None;
        let mut nodes = 0usize;

        while let Some(node) = stack.pop() {
            nodes += 1;
            if nodes > self.max_nodes {
                return Err(SolveError::NodeLimit(self.max_nodes));
            }
            if node.lower.iter().zip(&node.upper).any(|(l, u)| l > u) {
                continue;
            }

            let (values, objective) = match simplex::solve(&node.lower, &node.upper, rows, cost) {
                LpOutcome::Optimal { values, objective } => (values, objective),
                LpOutcome::Infeasible => continue,
                LpOutcome::Unbounded => return Err(SolveError::Unbounded),
                LpOutcome::IterationLimit => return Err(SolveError::IterationLimit),
            };

            if let Some((_, incumbent)) = &best {
                if objective >= incumbent - self.tolerance(*incumbent) {
                    continue;
                }
            }

            let fractional = vars.iter().enumerate().find(|(j, v)| {
                v.kind == VarKind::Integer && (values[*j] - values[*j].round()).abs() > self.integrality_tol
            });

            match fractional {
                None => {
                    let values: Vec<f64> = vars
                        .iter()
                        .zip(values)
                        .map(|(v, x)| if v.kind == VarKind::Integer { x.round() } else { x })
                        .collect();
                    let objective = values.iter().zip(cost).map(|(x, c)| x * c).sum();
                    trace!(nodes, objective, "New incumbent");
                    best = Some((values, objective));
                }
                Some((j, _)) => {
                    let x = values[j];
                    let mut down = node.clone();
                    down.upper[j] = x.floor();
                    let mut up = node;
                    up.lower[j] = x.ceil();
                    stack.push(up);
                    stack.push(down);
                }
            }
        }

        debug!(nodes, found = best.is_some(), "Branch and bound finished");
        best.ok_or(SolveError::Infeasible)
    }
}

impl Solver for BranchAndBound {
    fn solve(&self, problem: &Problem) -> Result<Solution, SolveError> {
        problem.validate()?;
        let n = problem.variables().len();

        let mut rows: Vec<Row> = problem
            .constraints()
            .iter()
            .map(|c| Row { coeffs: c.expr.dense(n), relation: c.relation, rhs: c.rhs })
            .collect();

        let mut values = Vec::new();
        for (stage, objective) in problem.objectives().iter().enumerate() {
            let cost = objective.dense(n);
            let (stage_values, optimum) = self.minimize(problem, &rows, &cost)?;
            debug!(stage, optimum, "Objective stage solved");
            rows.push(Row { coeffs: cost, relation: Relation::LessEq, rhs: optimum + self.tolerance(optimum) });
            values = stage_values;
        }

        let objective_values = problem.objectives().iter().map(|o| o.evaluate(&values)).collect();
        Ok(Solution { values, objective_values })
    }
}
