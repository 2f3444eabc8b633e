//! Active-set solver for bounded least-squares problems.
//!
//! Solves minimize ‖Q·x − r‖² subject to A·x = b and C·x ≤ d. Inequality
//! rows believed active are treated as equalities; the set is grown by the
//! most violated row and shrunk by rows whose Lagrange multiplier turns
//! negative, until the iterate is feasible and dual-feasible. The active
//! set is taken from and written back to the caller, which allows
//! warm-starting the next control cycle with the previous one.
//!
//! The solver is best-effort: if the iteration budget runs out, the last
//! iterate is left in `x` and the outcome says so, it never blocks.

extern crate nalgebra as na;
use na::{DMatrix, DVector};

use crate::linalg::pseudo_inverse;
use crate::problem::QpProblem;

/// Outcome of one solve. The solution itself is written into the `x`
/// argument in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpOutcome {
    Converged { iterations: usize },
    /// The stopping criterion was not reached in budget; `x` holds the
    /// last iterate.
    IterationLimit { iterations: usize },
    /// The underlying decomposition failed; `x` holds the last iterate.
    NumericalFailure,
}

/// Solver seam. The crate ships [`ActiveSetQp`]; an application can inject
/// another implementation honoring the same contract.
pub trait QpSolver {
    fn solve(&self, problem: &QpProblem, x: &mut DVector<f64>, active: &mut [bool]) -> QpOutcome;
}

/// Primal active-set solver over the pseudo-inverse.
pub struct ActiveSetQp {
    /// Iteration budget; each iteration performs one equality-constrained
    /// least-squares solve.
    pub max_iterations: usize,
    /// Constraint violation and multiplier sign tolerance.
    pub tolerance: f64,
}

impl Default for ActiveSetQp {
    fn default() -> Self {
        ActiveSetQp {
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

impl QpSolver for ActiveSetQp {
    fn solve(&self, problem: &QpProblem, x: &mut DVector<f64>, active: &mut [bool]) -> QpOutcome {
        for iteration in 1..=self.max_iterations {
            let act: Vec<usize> = active
                .iter()
                .enumerate()
                .filter(|&(_, &flag)| flag)
                .map(|(row, _)| row)
                .collect();

            let solved = match self.solve_working_set(problem, &act) {
                Ok(solved) => solved,
                Err(msg) => {
                    tracing::warn!(error = msg, "QP decomposition failed");
                    return QpOutcome::NumericalFailure;
                }
            };
            x.copy_from(&solved);

            // Grow the set by the most violated inactive row, if any.
            let residual = &problem.c * &solved - &problem.d;
            let mut worst: Option<(usize, f64)> = None;
            for row in 0..problem.inequality_rows() {
                if !active[row] && residual[row] > self.tolerance {
                    if worst.map_or(true, |(_, v)| residual[row] > v) {
                        worst = Some((row, residual[row]));
                    }
                }
            }
            if let Some((row, _)) = worst {
                active[row] = true;
                continue;
            }

            // Feasible. Release the active row with the most negative
            // multiplier, or accept the iterate if there is none.
            if act.is_empty() {
                return QpOutcome::Converged { iterations: iteration };
            }
            match self.multiplier_to_release(problem, &solved, &act) {
                Ok(Some(row)) => active[row] = false,
                Ok(None) => return QpOutcome::Converged { iterations: iteration },
                Err(msg) => {
                    tracing::warn!(error = msg, "QP multiplier computation failed");
                    return QpOutcome::NumericalFailure;
                }
            }
        }

        QpOutcome::IterationLimit {
            iterations: self.max_iterations,
        }
    }
}

impl ActiveSetQp {
    /// Least-squares solve with the equality constraints plus the active
    /// inequality rows treated as equalities: x = Ae⁺·be on the constraint
    /// manifold, plus the cost minimizer within its null space.
    fn solve_working_set(
        &self,
        problem: &QpProblem,
        act: &[usize],
    ) -> Result<DVector<f64>, &'static str> {
        let unknowns = problem.unknowns();
        let eq = problem.a.nrows();
        let rows = eq + act.len();

        if rows == 0 {
            return Ok(pseudo_inverse(&problem.q)? * &problem.r);
        }

        let mut ae = DMatrix::zeros(rows, unknowns);
        let mut be = DVector::zeros(rows);
        ae.view_mut((0, 0), (eq, unknowns)).copy_from(&problem.a);
        be.rows_mut(0, eq).copy_from(&problem.b);
        for (k, &row) in act.iter().enumerate() {
            ae.row_mut(eq + k).copy_from(&problem.c.row(row));
            be[eq + k] = problem.d[row];
        }

        let ae_pinv = pseudo_inverse(&ae)?;
        let x0 = &ae_pinv * &be;
        let null_projector = DMatrix::identity(unknowns, unknowns) - &ae_pinv * &ae;
        let q_reduced = &problem.q * &null_projector;
        let correction = pseudo_inverse(&q_reduced)? * (&problem.r - &problem.q * &x0);
        Ok(x0 + correction)
    }

    /// Lagrange multipliers of the active inequality rows from the
    /// stationarity condition Qᵀ(Qx − r) + Aᵀν + Cactᵀμ = 0. Returns the
    /// row whose μ is most negative, the candidate for release.
    fn multiplier_to_release(
        &self,
        problem: &QpProblem,
        x: &DVector<f64>,
        act: &[usize],
    ) -> Result<Option<usize>, &'static str> {
        let unknowns = problem.unknowns();
        let eq = problem.a.nrows();
        let gradient = problem.q.transpose() * (&problem.q * x - &problem.r);

        let mut constraints_t = DMatrix::zeros(unknowns, eq + act.len());
        constraints_t
            .view_mut((0, 0), (unknowns, eq))
            .copy_from(&problem.a.transpose());
        for (k, &row) in act.iter().enumerate() {
            constraints_t.set_column(eq + k, &problem.c.row(row).transpose());
        }

        let lambda = pseudo_inverse(&constraints_t)? * (-gradient);
        let mut worst: Option<(usize, f64)> = None;
        for (k, &row) in act.iter().enumerate() {
            let mu = lambda[eq + k];
            if mu < -self.tolerance && worst.map_or(true, |(_, v)| mu < v) {
                worst = Some((row, mu));
            }
        }
        Ok(worst.map(|(row, _)| row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::RobotParameters;
    use crate::problem;

    /// min x² subject to −x ≤ −1, i.e. x ≥ 1. Optimum sits on the bound.
    #[test]
    fn test_scalar_bound_becomes_active() {
        let p = QpProblem {
            q: DMatrix::identity(1, 1),
            r: DVector::zeros(1),
            a: DMatrix::zeros(0, 1),
            b: DVector::zeros(0),
            c: DMatrix::from_row_slice(1, 1, &[-1.0]),
            d: DVector::from_column_slice(&[-1.0]),
        };
        let solver = ActiveSetQp::default();
        let mut x = DVector::zeros(1);
        let mut active = vec![false];
        let outcome = solver.solve(&p, &mut x, &mut active);
        assert!(matches!(outcome, QpOutcome::Converged { .. }));
        assert!((x[0] - 1.0).abs() < 1e-9);
        assert!(active[0]);
    }

    /// min ‖x‖² subject to x0 + x1 = 2; no bound becomes active.
    #[test]
    fn test_equality_only() {
        let p = QpProblem {
            q: DMatrix::identity(2, 2),
            r: DVector::zeros(2),
            a: DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            b: DVector::from_column_slice(&[2.0]),
            c: DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]),
            d: DVector::from_column_slice(&[10.0, 10.0]),
        };
        let solver = ActiveSetQp::default();
        let mut x = DVector::zeros(2);
        let mut active = vec![false, false];
        let outcome = solver.solve(&p, &mut x, &mut active);
        assert!(matches!(outcome, QpOutcome::Converged { .. }));
        assert!((x[0] - 1.0).abs() < 1e-9);
        assert!((x[1] - 1.0).abs() < 1e-9);
        assert!(!active[0] && !active[1]);
    }

    /// A stale warm-start flag on a non-binding constraint must be
    /// released, not pin the solution to the wrong face.
    #[test]
    fn test_stale_active_flag_released() {
        let p = QpProblem {
            q: DMatrix::identity(2, 2),
            r: DVector::from_column_slice(&[3.0, 0.0]),
            a: DMatrix::zeros(0, 2),
            b: DVector::zeros(0),
            c: DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]),
            d: DVector::from_column_slice(&[10.0, 10.0]),
        };
        let solver = ActiveSetQp::default();
        let mut x = DVector::zeros(2);
        let mut active = vec![false, true]; // pretends x1 = 10 was binding
        let outcome = solver.solve(&p, &mut x, &mut active);
        assert!(matches!(outcome, QpOutcome::Converged { .. }));
        assert!((x[0] - 3.0).abs() < 1e-9);
        assert!(x[1].abs() < 1e-9);
        assert!(!active[1]);
    }

    /// Full-size problem: min ‖tau‖² with W·tau = 0 over 8 cables keeps
    /// every tension at zero, inside the [0, 100] box.
    #[test]
    fn test_zero_wrench_min_norm() {
        let params = RobotParameters::new(8, 100.0, 0.0, 100.0).unwrap();
        let mut p = problem::min_norm(&params);
        // Any rank-6 wrench matrix; equality right side stays zero.
        for i in 0..6 {
            p.a[(i, i)] = 1.0;
        }
        p.a[(0, 6)] = 1.0;
        p.a[(1, 7)] = 1.0;

        let solver = ActiveSetQp::default();
        let mut x = DVector::from_element(8, 5.0);
        let mut active = vec![false; 16];
        let outcome = solver.solve(&p, &mut x, &mut active);
        assert!(matches!(outcome, QpOutcome::Converged { .. }));
        assert!(x.norm() < 1e-9);
    }
}
