//! Closed-form tension redistribution with iterative saturation handling.
//!
//! Starting from the midrange tension on every cable, the minimum-norm
//! deviation satisfying the wrench equality is computed in one shot. Each
//! cable whose tension falls outside the bounds is then fixed at the
//! violated bound, its wrench contribution folded into the right-hand
//! side, and the reduced system re-solved. Every such saturation event
//! permanently spends one order of redundancy, so the loop finishes after
//! at most n − 6 + 1 solves.

extern crate nalgebra as na;
use na::{DMatrix, DVector};

use crate::distribution::SolveStatus;
use crate::linalg::pseudo_inverse;
use crate::parameters::RobotParameters;

/// How far a tension may stick out of its bound before the cable is
/// considered saturated. Too tight causes spurious infeasibility from
/// solver noise, too loose lets real violations through.
pub const SATURATION_TOLERANCE: f64 = 1e-3;

/// Scratch state of the closed-form method, reset at the start of every
/// cycle. Owned by the distributor's closed-form variant.
pub struct ClosedFormState {
    /// Reference tension f_m: midrange, zeroed for saturated cables.
    reference: DVector<f64>,
    /// Desired wrench with the saturated cables' contribution removed.
    reduced_wrench: DVector<f64>,
    /// Wrench matrix with saturated columns zeroed.
    reduced_matrix: DMatrix<f64>,
    /// Accumulated tensions of the cables fixed at a bound.
    fixed: DVector<f64>,
    /// Remaining redundancy order; each saturation spends one.
    redundancy: i64,
    /// Saturation tolerance, [`SATURATION_TOLERANCE`] unless tuned.
    pub tolerance: f64,
}

impl ClosedFormState {
    pub fn new(params: &RobotParameters) -> Self {
        let n = params.cables;
        ClosedFormState {
            reference: DVector::zeros(n),
            reduced_wrench: DVector::zeros(6),
            reduced_matrix: DMatrix::zeros(6, n),
            fixed: DVector::zeros(n),
            redundancy: params.redundancy() as i64,
            tolerance: SATURATION_TOLERANCE,
        }
    }

    /// One cycle of the closed-form distribution. Always returns a tension
    /// vector; the status tells whether it respects the bounds.
    pub fn redistribute(
        &mut self,
        params: &RobotParameters,
        w_matrix: &DMatrix<f64>,
        wrench: &DVector<f64>,
    ) -> (DVector<f64>, SolveStatus) {
        let n = params.cables;
        self.reference.fill(params.midrange());
        self.fixed.fill(0.0);
        self.reduced_matrix.copy_from(w_matrix);
        self.reduced_wrench.copy_from(wrench);
        self.redundancy = params.redundancy() as i64;

        let pinv = match pseudo_inverse(w_matrix) {
            Ok(pinv) => pinv,
            Err(msg) => {
                tracing::warn!(error = msg, "wrench matrix pseudo-inverse failed");
                return (self.reference.clone(), SolveStatus::NonConvergent);
            }
        };
        let mut x = &self.reference + pinv * (wrench - w_matrix * &self.reference);

        // Feasibility pre-check: the deviation from midrange must fit in
        // the radius the platform mass and tension range allow.
        let deviation = (&x - &self.reference).norm();
        let radius = params.mass.sqrt() * (params.tau_max + params.tau_min) / 4.0;
        if deviation > radius {
            tracing::warn!(
                deviation,
                radius,
                "no feasible tension distribution: deviation exceeds the midrange radius"
            );
            return (x, SolveStatus::InfeasibleWrench);
        }

        loop {
            let violation = (0..n).find_map(|i| {
                if x[i] > params.tau_max + self.tolerance {
                    Some((i, params.tau_max))
                } else if x[i] < params.tau_min - self.tolerance {
                    Some((i, params.tau_min))
                } else {
                    None
                }
            });
            let Some((cable, bound)) = violation else {
                return (x, SolveStatus::Optimal);
            };
            if self.redundancy < 0 {
                tracing::warn!(cable, "redundancy exhausted, no solution exists within the bounds");
                return (x, SolveStatus::InfeasibleWrench);
            }

            // Fix the cable at the violated bound and remove it from the
            // reduced system.
            let column = self.reduced_matrix.column(cable).clone_owned();
            self.reduced_wrench -= &column * bound;
            self.fixed[cable] = bound;
            self.reference[cable] = 0.0;
            for row in 0..6 {
                self.reduced_matrix[(row, cable)] = 0.0;
            }
            self.redundancy -= 1;

            let pinv = match pseudo_inverse(&self.reduced_matrix) {
                Ok(pinv) => pinv,
                Err(msg) => {
                    tracing::warn!(error = msg, "reduced pseudo-inverse failed");
                    return (x, SolveStatus::NonConvergent);
                }
            };
            x = &self.reference
                + pinv * (&self.reduced_wrench - &self.reduced_matrix * &self.reference);
            x += &self.fixed;
        }
    }
}
