//! Dense two-phase primal simplex for small bounded LPs.
//!
//! Entering and leaving variables follow Bland's rule, so the pivot sequence
//! is fully determined by the input and the method cannot cycle.

use super::Relation;

const MAX_PIVOTS: usize = 50_000;
const PIVOT_TOL: f64 = 1e-9;

/// Dense row `coeffs · x (relation) rhs`
#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub coeffs: Vec<f64>,
    pub relation: Relation,
    pub rhs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LpOutcome {
    Optimal { values: Vec<f64>, objective: f64 },
    Infeasible,
    Unbounded,
    IterationLimit,
}

enum Stop {
    Unbounded,
    IterationLimit,
}

struct Tableau {
    /// m rows of `cols` coefficients followed by the rhs
    rows: Vec<Vec<f64>>,
    basis: Vec<usize>,
    cols: usize,
    artificial: Vec<bool>,
}

impl Tableau {
    fn rhs(&self, i: usize) -> f64 {
        self.rows[i][self.cols]
    }

    fn pivot(&mut self, r: usize, c: usize) {
        let p = self.rows[r][c];
        for v in self.rows[r].iter_mut() {
            *v /= p;
        }
        let pivot_row = self.rows[r].clone();
        for (i, row) in self.rows.iter_mut().enumerate() {
            if i == r {
                continue;
            }
            let f = row[c];
            if f != 0.0 {
                for (v, pv) in row.iter_mut().zip(&pivot_row) {
                    *v -= f * pv;
                }
            }
        }
        self.basis[r] = c;
    }

    fn objective(&self, cost: &[f64]) -> f64 {
        self.basis
            .iter()
            .enumerate()
            .map(|(i, &b)| cost[b] * self.rhs(i))
            .sum()
    }

    /// Minimise `cost` from the current basic feasible solution
    fn optimize(&mut self, cost: &[f64], allow_artificial: bool) -> Result<(), Stop> {
        for _ in 0..MAX_PIVOTS {
            // reduced costs d_j = c_j - c_B · column_j
            let mut reduced = cost.to_vec();
            for (i, &b) in self.basis.iter().enumerate() {
                let cb = cost[b];
                if cb != 0.0 {
                    for (d, a) in reduced.iter_mut().zip(&self.rows[i][..self.cols]) {
                        *d -= cb * a;
                    }
                }
            }

            let entering = (0..self.cols)
                .filter(|&j| allow_artificial || !self.artificial[j])
                .find(|&j| reduced[j] < -PIVOT_TOL);
            let Some(c) = entering else {
                return Ok(());
            };

            let mut leaving: Option<(usize, f64)> = None;
            for i in 0..self.rows.len() {
                let a = self.rows[i][c];
                if a <= PIVOT_TOL {
                    continue;
                }
                let ratio = self.rhs(i) / a;
                leaving = match leaving {
                    None => Some((i, ratio)),
                    Some((r, best)) => {
                        if ratio < best - PIVOT_TOL
                            || ((ratio - best).abs() <= PIVOT_TOL && self.basis[i] < self.basis[r])
                        {
                            Some((i, ratio))
                        } else {
                            Some((r, best))
                        }
                    }
                };
            }
            match leaving {
                Some((r, _)) => self.pivot(r, c),
                None => return Err(Stop::Unbounded),
            }
        }
        Err(Stop::IterationLimit)
    }

    /// Pivot remaining zero-valued artificials out of the basis where possible
    fn drive_out_artificials(&mut self) {
        for i in 0..self.rows.len() {
            if !self.artificial[self.basis[i]] {
                continue;
            }
            let replacement = (0..self.cols)
                .find(|&j| !self.artificial[j] && self.rows[i][j].abs() > PIVOT_TOL);
            // No replacement means the row is redundant; it stays inert
            if let Some(j) = replacement {
                self.pivot(i, j);
            }
        }
    }
}

fn flip(relation: Relation) -> Relation {
    match relation {
        Relation::LessEq => Relation::GreaterEq,
        Relation::GreaterEq => Relation::LessEq,
        Relation::Equal => Relation::Equal,
    }
}

/// Minimise `cost · x` subject to `rows` and `lower <= x <= upper`.
///
/// Lower bounds must be finite; upper bounds may be infinite.
pub(crate) fn solve(lower: &[f64], upper: &[f64], rows: &[Row], cost: &[f64]) -> LpOutcome {
    let n = lower.len();

    // Shift to y = x - lower >= 0 and turn finite upper bounds into rows
    let mut std_rows: Vec<(Vec<f64>, Relation, f64)> = rows
        .iter()
        .map(|r| {
            let shift: f64 = r.coeffs.iter().zip(lower).map(|(a, l)| a * l).sum();
            (r.coeffs.clone(), r.relation, r.rhs - shift)
        })
        .collect();
    for j in 0..n {
        if upper[j].is_finite() {
            let mut coeffs = vec![0.0; n];
            coeffs[j] = 1.0;
            std_rows.push((coeffs, Relation::LessEq, upper[j] - lower[j]));
        }
    }
    for (coeffs, relation, rhs) in std_rows.iter_mut() {
        if *rhs < 0.0 {
            coeffs.iter_mut().for_each(|c| *c = -*c);
            *rhs = -*rhs;
            *relation = flip(*relation);
        }
    }

    let m = std_rows.len();
    let n_slack = std_rows.iter().filter(|r| r.1 != Relation::Equal).count();
    let n_art = std_rows.iter().filter(|r| r.1 != Relation::LessEq).count();
    let cols = n + n_slack + n_art;

    let mut tab = Tableau {
        rows: vec![vec![0.0; cols + 1]; m],
        basis: vec![0; m],
        cols,
        artificial: vec![false; cols],
    };
    let (mut s, mut a) = (n, n + n_slack);
    for (i, (coeffs, relation, rhs)) in std_rows.iter().enumerate() {
        tab.rows[i][..n].copy_from_slice(coeffs);
        tab.rows[i][cols] = *rhs;
        match relation {
            Relation::LessEq => {
                tab.rows[i][s] = 1.0;
                tab.basis[i] = s;
                s += 1;
            }
            Relation::GreaterEq => {
                tab.rows[i][s] = -1.0;
                s += 1;
                tab.rows[i][a] = 1.0;
                tab.basis[i] = a;
                tab.artificial[a] = true;
                a += 1;
            }
            Relation::Equal => {
                tab.rows[i][a] = 1.0;
                tab.basis[i] = a;
                tab.artificial[a] = true;
                a += 1;
            }
        }
    }

    if n_art > 0 {
        let phase1: Vec<f64> = tab.artificial.iter().map(|&art| if art { 1.0 } else { 0.0 }).collect();
        match tab.optimize(&phase1, true) {
            Ok(()) => {}
            Err(Stop::IterationLimit) => return LpOutcome::IterationLimit,
            Err(Stop::Unbounded) => return LpOutcome::Infeasible,
        }
        let scale = std_rows.iter().map(|r| r.2).fold(1.0_f64, f64::max);
        if tab.objective(&phase1) > 1e-7 * scale {
            return LpOutcome::Infeasible;
        }
        tab.drive_out_artificials();
    }

    let mut phase2 = vec![0.0; cols];
    phase2[..n].copy_from_slice(cost);
    match tab.optimize(&phase2, false) {
        Ok(()) => {}
        Err(Stop::Unbounded) => return LpOutcome::Unbounded,
        Err(Stop::IterationLimit) => return LpOutcome::IterationLimit,
    }

    let mut values = lower.to_vec();
    for (i, &b) in tab.basis.iter().enumerate() {
        if b < n {
            values[b] = (lower[b] + tab.rhs(i).max(0.0)).min(upper[b]);
        }
    }
    let objective = values.iter().zip(cost).map(|(x, c)| x * c).sum();
    LpOutcome::Optimal { values, objective }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimal(outcome: LpOutcome) -> (Vec<f64>, f64) {
        match outcome {
            LpOutcome::Optimal { values, objective } => (values, objective),
            other => panic!("expected optimum, got {:?}", other),
        }
    }

    #[test]
    fn test_covering_lp_picks_cheapest_capacity() {
        // min 100a + 60b  s.t. 10a + 5b >= 120, a <= 15, b <= 4
        let rows = vec![Row { coeffs: vec![10.0, 5.0], relation: Relation::GreaterEq, rhs: 120.0 }];
        let (x, obj) = optimal(solve(&[0.0, 0.0], &[15.0, 4.0], &rows, &[100.0, 60.0]));
        assert!((x[0] - 12.0).abs() < 1e-9);
        assert!(x[1].abs() < 1e-9);
        assert!((obj - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn test_lower_bounds_are_respected() {
        let rows = vec![Row { coeffs: vec![1.0, 1.0], relation: Relation::GreaterEq, rhs: 1.0 }];
        let (x, obj) = optimal(solve(&[2.0, 0.5], &[10.0, 10.0], &rows, &[1.0, 1.0]));
        assert_eq!(x, vec![2.0, 0.5]);
        assert_eq!(obj, 2.5);
    }

    #[test]
    fn test_equality_rows() {
        // min x - y  s.t. x + y = 4, x - y >= -2
        let rows = vec![
            Row { coeffs: vec![1.0, 1.0], relation: Relation::Equal, rhs: 4.0 },
            Row { coeffs: vec![1.0, -1.0], relation: Relation::GreaterEq, rhs: -2.0 },
        ];
        let (x, obj) = optimal(solve(&[0.0, 0.0], &[f64::INFINITY, f64::INFINITY], &rows, &[1.0, -1.0]));
        assert!((x[0] - 1.0).abs() < 1e-9 && (x[1] - 3.0).abs() < 1e-9);
        assert!((obj + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_infeasible_when_bounds_cannot_cover() {
        let rows = vec![Row { coeffs: vec![10.0], relation: Relation::GreaterEq, rhs: 151.0 }];
        assert_eq!(solve(&[0.0], &[15.0], &rows, &[1.0]), LpOutcome::Infeasible);
    }

    #[test]
    fn test_exact_boundary_is_feasible() {
        let rows = vec![Row { coeffs: vec![10.0], relation: Relation::GreaterEq, rhs: 150.0 }];
        let (x, _) = optimal(solve(&[0.0], &[15.0], &rows, &[1.0]));
        assert!((x[0] - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_unbounded_detected() {
        let rows = vec![Row { coeffs: vec![1.0], relation: Relation::GreaterEq, rhs: 1.0 }];
        assert_eq!(solve(&[0.0], &[f64::INFINITY], &rows, &[-1.0]), LpOutcome::Unbounded);
    }
}
