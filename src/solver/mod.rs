//! Constrained optimisation abstraction
//!
//! A [`Problem`] is a set of bounded variables (continuous or integer),
//! linear constraints and one or more linear objectives minimised in
//! lexicographic order. Business rules build problems; any [`Solver`]
//! backend can solve them. [`BranchAndBound`] is the built-in backend.

mod branch_bound;
mod simplex;

pub use branch_bound::BranchAndBound;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(usize);

impl VarId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Integer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub lower: f64,
    /// May be `f64::INFINITY`
    pub upper: f64,
    pub kind: VarKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, var: VarId, coeff: f64) -> Self {
        self.terms.push((var, coeff));
        self
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|(v, c)| c * values[v.0]).sum()
    }

    /// Dense coefficient vector over `n` variables, duplicate terms summed
    pub(crate) fn dense(&self, n: usize) -> Vec<f64> {
        let mut out = vec![0.0; n];
        for (v, c) in &self.terms {
            out[v.0] += c;
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessEq,
    GreaterEq,
    Equal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub expr: LinearExpr,
    pub relation: Relation,
    pub rhs: f64,
}

impl Constraint {
    /// Distance from violation at `values`; negative when violated
    pub fn slack(&self, values: &[f64]) -> f64 {
        let lhs = self.expr.evaluate(values);
        match self.relation {
            Relation::LessEq => self.rhs - lhs,
            Relation::GreaterEq => lhs - self.rhs,
            Relation::Equal => -(lhs - self.rhs).abs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Problem {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objectives: Vec<LinearExpr>,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, name: impl Into<String>, lower: f64, upper: f64, kind: VarKind) -> VarId {
        self.variables.push(Variable { name: name.into(), lower, upper, kind });
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        expr: LinearExpr,
        relation: Relation,
        rhs: f64,
    ) -> usize {
        self.constraints.push(Constraint { name: name.into(), expr, relation, rhs });
        self.constraints.len() - 1
    }

    /// Add an objective. Each call adds a lower-priority objective that only
    /// breaks ties among optima of the earlier ones.
    pub fn minimize(&mut self, expr: LinearExpr) {
        self.objectives.push(expr);
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objectives(&self) -> &[LinearExpr] {
        &self.objectives
    }

    pub fn validate(&self) -> Result<(), SolveError> {
        if self.objectives.is_empty() {
            return Err(SolveError::Malformed("problem has no objective".into()));
        }
        for v in &self.variables {
            if !v.lower.is_finite() || v.upper.is_nan() || v.upper < v.lower {
                return Err(SolveError::Malformed(format!(
                    "variable {} has invalid bounds [{}, {}]",
                    v.name, v.lower, v.upper
                )));
            }
        }
        let n = self.variables.len();
        let check_terms = |name: &str, expr: &LinearExpr| {
            if expr.terms().iter().any(|(v, c)| v.0 >= n || !c.is_finite()) {
                return Err(SolveError::Malformed(format!("{} has an invalid term", name)));
            }
            Ok(())
        };
        for c in &self.constraints {
            if !c.rhs.is_finite() {
                return Err(SolveError::Malformed(format!("constraint {} has non-finite rhs", c.name)));
            }
            check_terms(&c.name, &c.expr)?;
        }
        for o in &self.objectives {
            check_terms("objective", o)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    values: Vec<f64>,
    objective_values: Vec<f64>,
}

impl Solution {
    pub fn value(&self, var: VarId) -> f64 {
        self.values[var.0]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// One value per objective, in priority order
    pub fn objective_values(&self) -> &[f64] {
        &self.objective_values
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("problem is infeasible")]
    Infeasible,

    #[error("problem is unbounded")]
    Unbounded,

    #[error("branch and bound exceeded {0} nodes")]
    NodeLimit(usize),

    #[error("simplex exceeded its pivot limit")]
    IterationLimit,

    #[error("malformed problem: {0}")]
    Malformed(String),
}

pub trait Solver: Send + Sync {
    fn solve(&self, problem: &Problem) -> Result<Solution, SolveError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slack_sign() {
        let mut p = Problem::new();
        let x = p.add_variable("x", 0.0, 10.0, VarKind::Continuous);
        p.add_constraint("ge", LinearExpr::new().term(x, 2.0), Relation::GreaterEq, 4.0);
        p.add_constraint("le", LinearExpr::new().term(x, 1.0), Relation::LessEq, 1.0);
        let values = [3.0];
        assert_eq!(p.constraints()[0].slack(&values), 2.0);
        assert_eq!(p.constraints()[1].slack(&values), -2.0);
    }

    #[test]
    fn test_validate_rejects_bad_problems() {
        let mut p = Problem::new();
        let x = p.add_variable("x", 0.0, 1.0, VarKind::Continuous);
        assert!(matches!(p.validate(), Err(SolveError::Malformed(_))));

        p.minimize(LinearExpr::new().term(x, 1.0));
        assert!(p.validate().is_ok());

        p.add_variable("y", 2.0, 1.0, VarKind::Integer);
        assert!(matches!(p.validate(), Err(SolveError::Malformed(_))));
    }

    #[test]
    fn test_duplicate_terms_are_summed() {
        let mut p = Problem::new();
        let x = p.add_variable("x", 0.0, 1.0, VarKind::Continuous);
        let e = LinearExpr::new().term(x, 1.5).term(x, 2.0);
        assert_eq!(e.dense(1), vec![3.5]);
        assert_eq!(e.evaluate(&[2.0]), 7.0);
    }
}
