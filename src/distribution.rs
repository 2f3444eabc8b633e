//! Tension distributor: the per-cycle entry point of the crate.
//!
//! A [`TensionDistributor`] is built once for a robot and a distribution
//! mode; each control cycle it receives the fresh wrench matrix and
//! desired wrench and returns the cable tensions. The mode-specific
//! matrices and scratch state live in one variant per mode, so the
//! dispatch is an exhaustive match and no mode can touch another's state.

extern crate nalgebra as na;
use na::{DMatrix, DVector};

use crate::closed_form::{ClosedFormState, SATURATION_TOLERANCE};
use crate::distribution_error::{ConfigError, DistributionError};
use crate::linalg::pseudo_inverse;
use crate::parameters::RobotParameters;
use crate::polytope::PolytopeState;
use crate::problem::{self, QpProblem};
use crate::qp::{ActiveSetQp, QpOutcome, QpSolver};
use crate::rate_limit::RateLimiter;
use crate::telemetry::{NullTelemetry, TelemetrySink};

/// The redundancy-resolution criterion. Fixed for the distributor's
/// lifetime; it decides the shapes of all internal matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Plain pseudo-inverse, no bound enforcement. Out-of-bound tensions
    /// are reported, never an error.
    Unconstrained,
    /// min ‖tau‖² subject to W·tau = w and the tension box.
    MinNorm,
    /// min ‖W·tau − w‖² subject to the tension box; the desired wrench
    /// need not be feasible.
    MinWrenchError,
    /// min-norm with an interpolation factor between the previous and the
    /// desired wrench, backing off when the full step is infeasible.
    MinNormInterp,
    /// Iterative closed-form redistribution of saturated cables.
    ClosedForm,
    /// Solution at the centroid of the feasible polytope's 2-D projection.
    Barycenter,
    /// min-norm over (tau, Kp, Kd) with bounded controller gains entering
    /// the wrench equality.
    AugmentedGain,
}

/// What a cycle produced, beyond the tension vector itself. Recoverable
/// conditions land here; they never interrupt the control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    /// Unconstrained mode produced tensions outside the box.
    BoundsViolated,
    /// The desired wrench is unreachable within the tension bounds; the
    /// returned tensions are best effort.
    InfeasibleWrench,
    /// The solver ran out of budget or a decomposition failed; the
    /// returned tensions are the last iterate.
    NonConvergent,
    /// No vertex of the projected polytope satisfies all bounds; the
    /// particular solution is returned without centroid correction.
    EmptyPolytope,
}

/// Controller gains produced by the gain-augmented mode.
#[derive(Debug, Clone, Copy)]
pub struct Gains {
    pub kp: f64,
    pub kd: f64,
}

/// Result of one control cycle.
#[derive(Debug, Clone)]
pub struct Distribution {
    /// Cable tensions, one per cable.
    pub tensions: DVector<f64>,
    pub status: SolveStatus,
    /// Interpolation factor alpha of the interpolated mode.
    pub interpolation: Option<f64>,
    /// Gains of the gain-augmented mode.
    pub gains: Option<Gains>,
}

/// Construction-time options beyond the robot parameters and mode.
pub struct DistributorOptions {
    /// Carry the QP active set across cycles. When disabled the set is
    /// cleared before every solve.
    pub warm_start: bool,
    /// Maximum tension change per cycle, if limiting is wanted.
    pub rate_limit: Option<f64>,
    /// Sink for intermediate geometry (barycenter mode).
    pub telemetry: Box<dyn TelemetrySink>,
    /// The QP solver to delegate the constrained modes to.
    pub qp: Box<dyn QpSolver>,
}

impl Default for DistributorOptions {
    fn default() -> Self {
        DistributorOptions {
            warm_start: false,
            rate_limit: None,
            telemetry: Box::new(NullTelemetry),
            qp: Box::new(ActiveSetQp::default()),
        }
    }
}

/// Per-mode state: each variant owns exactly the matrices and scratch its
/// formulation needs.
enum ModeState {
    Unconstrained,
    MinNorm(QpProblem),
    MinWrenchError(QpProblem),
    MinNormInterp {
        problem: QpProblem,
        previous_wrench: DVector<f64>,
    },
    AugmentedGain(QpProblem),
    ClosedForm(ClosedFormState),
    Barycenter(PolytopeState),
}

pub struct TensionDistributor {
    params: RobotParameters,
    state: ModeState,
    /// Current solution vector; the leading n entries are the tensions.
    x: DVector<f64>,
    /// Active-set flags, one per inequality row of the mode's problem.
    active: Vec<bool>,
    warm_start: bool,
    rate_limiter: Option<RateLimiter>,
    telemetry: Box<dyn TelemetrySink>,
    qp: Box<dyn QpSolver>,
}

impl TensionDistributor {
    /// Builds the distributor for one robot and mode. All shape and bound
    /// errors are fatal here; after construction no cycle can fail on
    /// configuration.
    pub fn new(
        params: RobotParameters,
        mode: Mode,
        options: DistributorOptions,
    ) -> Result<Self, ConfigError> {
        // Re-validate: the parameters type can be constructed literally.
        let params = RobotParameters::new(params.cables, params.mass, params.tau_min, params.tau_max)?;
        if mode == Mode::Barycenter && params.cables != 8 {
            return Err(ConfigError::UnsupportedRedundancy { cables: params.cables });
        }
        let rate_limiter = match options.rate_limit {
            Some(delta) if delta <= 0.0 => {
                return Err(ConfigError::NonPositiveRateLimit { delta });
            }
            Some(delta) => Some(RateLimiter::new(delta)),
            None => None,
        };

        let n = params.cables;
        let (state, unknowns) = match mode {
            Mode::Unconstrained => (ModeState::Unconstrained, n),
            Mode::MinNorm => (ModeState::MinNorm(problem::min_norm(&params)), n),
            Mode::MinWrenchError => {
                (ModeState::MinWrenchError(problem::min_wrench_error(&params)), n)
            }
            Mode::MinNormInterp => (
                ModeState::MinNormInterp {
                    problem: problem::min_norm_interp(&params),
                    previous_wrench: DVector::zeros(6),
                },
                n + 1,
            ),
            Mode::AugmentedGain => (ModeState::AugmentedGain(problem::augmented_gain(&params)), n + 2),
            Mode::ClosedForm => (ModeState::ClosedForm(ClosedFormState::new(&params)), n),
            Mode::Barycenter => (ModeState::Barycenter(PolytopeState::new(&params)), n),
        };
        let active_len = match &state {
            ModeState::MinNorm(p) | ModeState::MinWrenchError(p) | ModeState::AugmentedGain(p) => {
                p.inequality_rows()
            }
            ModeState::MinNormInterp { problem, .. } => problem.inequality_rows(),
            _ => 0,
        };

        Ok(TensionDistributor {
            params,
            state,
            x: DVector::zeros(unknowns),
            active: vec![false; active_len],
            warm_start: options.warm_start,
            rate_limiter,
            telemetry: options.telemetry,
            qp: options.qp,
        })
    }

    pub fn mode(&self) -> Mode {
        match self.state {
            ModeState::Unconstrained => Mode::Unconstrained,
            ModeState::MinNorm(_) => Mode::MinNorm,
            ModeState::MinWrenchError(_) => Mode::MinWrenchError,
            ModeState::MinNormInterp { .. } => Mode::MinNormInterp,
            ModeState::AugmentedGain(_) => Mode::AugmentedGain,
            ModeState::ClosedForm(_) => Mode::ClosedForm,
            ModeState::Barycenter(_) => Mode::Barycenter,
        }
    }

    /// One control cycle for every mode except the gain-augmented one.
    ///
    /// `w_matrix` is the 6 x n wrench matrix of the current pose, `wrench`
    /// the desired platform wrench. The result always carries a tension
    /// vector; check `status` (and, if needed, [`bound_violations`])
    /// before trusting it.
    ///
    /// [`bound_violations`]: TensionDistributor::bound_violations
    pub fn distribute(
        &mut self,
        w_matrix: &DMatrix<f64>,
        wrench: &DVector<f64>,
    ) -> Result<Distribution, DistributionError> {
        self.check_cycle_inputs(w_matrix, wrench)?;
        if !self.warm_start {
            self.active.fill(false);
        }
        let n = self.params.cables;
        let mut interpolation = None;

        let status = match &mut self.state {
            ModeState::Unconstrained => match pseudo_inverse(w_matrix) {
                Ok(pinv) => {
                    self.x = pinv * wrench;
                    let violated = (0..n).any(|i| {
                        self.x[i] > self.params.tau_max + SATURATION_TOLERANCE
                            || self.x[i] < self.params.tau_min - SATURATION_TOLERANCE
                    });
                    if violated {
                        tracing::warn!("unconstrained solution violates the tension bounds");
                        SolveStatus::BoundsViolated
                    } else {
                        SolveStatus::Optimal
                    }
                }
                Err(msg) => {
                    tracing::warn!(error = msg, "wrench matrix pseudo-inverse failed");
                    SolveStatus::NonConvergent
                }
            },
            ModeState::MinNorm(problem) => {
                problem.a.copy_from(w_matrix);
                problem.b.copy_from(wrench);
                if let Some(limiter) = &self.rate_limiter {
                    limiter.tighten(&mut problem.d, &self.params);
                }
                Self::qp_status(self.qp.solve(problem, &mut self.x, &mut self.active))
            }
            ModeState::MinWrenchError(problem) => {
                problem.q.copy_from(w_matrix);
                problem.r.copy_from(wrench);
                if let Some(limiter) = &self.rate_limiter {
                    limiter.tighten(&mut problem.d, &self.params);
                }
                Self::qp_status(self.qp.solve(problem, &mut self.x, &mut self.active))
            }
            ModeState::MinNormInterp {
                problem,
                previous_wrench,
            } => {
                problem.a.view_mut((0, 0), (6, n)).copy_from(w_matrix);
                for i in 0..6 {
                    problem.a[(i, n)] = previous_wrench[i] - wrench[i];
                }
                problem.b.copy_from(previous_wrench);
                if let Some(limiter) = &self.rate_limiter {
                    limiter.tighten(&mut problem.d, &self.params);
                }
                let status = Self::qp_status(self.qp.solve(problem, &mut self.x, &mut self.active));
                previous_wrench.copy_from(wrench);
                interpolation = Some(self.x[n]);
                status
            }
            ModeState::AugmentedGain(_) => return Err(DistributionError::GainsRequired),
            ModeState::ClosedForm(state) => {
                let (tau, status) = state.redistribute(&self.params, w_matrix, wrench);
                self.x.copy_from(&tau);
                status
            }
            ModeState::Barycenter(state) => {
                let (tau, status) =
                    state.solve(&self.params, w_matrix, wrench, self.telemetry.as_ref());
                self.x.copy_from(&tau);
                status
            }
        };

        Ok(self.finish(status, interpolation, None))
    }

    /// One control cycle of the gain-augmented mode, which additionally
    /// takes the velocity and position tracking errors and yields the
    /// controller gains alongside the tensions.
    pub fn distribute_with_gains(
        &mut self,
        w_matrix: &DMatrix<f64>,
        velocity_error: &DVector<f64>,
        position_error: &DVector<f64>,
        wrench: &DVector<f64>,
    ) -> Result<Distribution, DistributionError> {
        self.check_cycle_inputs(w_matrix, wrench)?;
        if velocity_error.len() != 6 {
            return Err(DistributionError::WrenchLength {
                len: velocity_error.len(),
            });
        }
        if position_error.len() != 6 {
            return Err(DistributionError::WrenchLength {
                len: position_error.len(),
            });
        }
        if !self.warm_start {
            self.active.fill(false);
        }
        let n = self.params.cables;

        let ModeState::AugmentedGain(problem) = &mut self.state else {
            return Err(DistributionError::GainsNotSupported);
        };
        problem.a.view_mut((0, 0), (6, n)).copy_from(w_matrix);
        for i in 0..6 {
            problem.a[(i, n)] = -position_error[i];
            problem.a[(i, n + 1)] = -velocity_error[i];
        }
        problem.b.copy_from(wrench);
        if let Some(limiter) = &self.rate_limiter {
            limiter.tighten(&mut problem.d, &self.params);
        }
        let status = Self::qp_status(self.qp.solve(problem, &mut self.x, &mut self.active));

        let gains = Gains {
            kp: self.x[n],
            kd: self.x[n + 1],
        };
        Ok(self.finish(status, None, Some(gains)))
    }

    /// Indices of cables whose tension violates the box, the explicit
    /// post-hoc check the caller owns. The distributor never clamps.
    pub fn bound_violations(&self, tau: &DVector<f64>) -> Vec<usize> {
        (0..self.params.cables)
            .filter(|&i| {
                tau[i] > self.params.tau_max + SATURATION_TOLERANCE
                    || tau[i] < self.params.tau_min - SATURATION_TOLERANCE
            })
            .collect()
    }

    /// Drops warm-start and rate-limit memory, e.g. after a discontinuity
    /// in the commanded trajectory.
    pub fn reset(&mut self) {
        self.active.fill(false);
        if let Some(limiter) = &mut self.rate_limiter {
            limiter.reset();
        }
    }

    fn check_cycle_inputs(
        &self,
        w_matrix: &DMatrix<f64>,
        wrench: &DVector<f64>,
    ) -> Result<(), DistributionError> {
        if w_matrix.nrows() != 6 || w_matrix.ncols() != self.params.cables {
            return Err(DistributionError::WrenchMatrixShape {
                rows: w_matrix.nrows(),
                cols: w_matrix.ncols(),
                cables: self.params.cables,
            });
        }
        if wrench.len() != 6 {
            return Err(DistributionError::WrenchLength { len: wrench.len() });
        }
        Ok(())
    }

    fn qp_status(outcome: QpOutcome) -> SolveStatus {
        match outcome {
            QpOutcome::Converged { .. } => SolveStatus::Optimal,
            QpOutcome::IterationLimit { iterations } => {
                tracing::warn!(iterations, "QP solver out of budget, returning the last iterate");
                SolveStatus::NonConvergent
            }
            QpOutcome::NumericalFailure => {
                tracing::warn!("QP solver numerical failure, returning the last iterate");
                SolveStatus::NonConvergent
            }
        }
    }

    fn finish(
        &mut self,
        status: SolveStatus,
        interpolation: Option<f64>,
        gains: Option<Gains>,
    ) -> Distribution {
        let tensions = self.x.rows(0, self.params.cables).into_owned();
        if let Some(limiter) = &mut self.rate_limiter {
            limiter.record(&tensions);
        }
        Distribution {
            tensions,
            status,
            interpolation,
            gains,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RobotParameters {
        RobotParameters::new(8, 100.0, 0.0, 100.0).unwrap()
    }

    fn wrench_matrix() -> DMatrix<f64> {
        let mut w = DMatrix::zeros(6, 8);
        for i in 0..6 {
            w[(i, i)] = 1.0;
        }
        w[(0, 6)] = 1.0;
        w[(1, 7)] = 1.0;
        w
    }

    #[test]
    fn test_barycenter_needs_eight_cables() {
        let p = RobotParameters::new(9, 100.0, 0.0, 100.0).unwrap();
        let err = TensionDistributor::new(p, Mode::Barycenter, DistributorOptions::default());
        assert!(matches!(err, Err(ConfigError::UnsupportedRedundancy { cables: 9 })));
    }

    #[test]
    fn test_negative_rate_limit_rejected() {
        let options = DistributorOptions {
            rate_limit: Some(-1.0),
            ..DistributorOptions::default()
        };
        let err = TensionDistributor::new(params(), Mode::MinNorm, options);
        assert!(matches!(err, Err(ConfigError::NonPositiveRateLimit { .. })));
    }

    #[test]
    fn test_wrong_entry_point_for_gains() {
        let mut solver =
            TensionDistributor::new(params(), Mode::AugmentedGain, DistributorOptions::default())
                .unwrap();
        let err = solver.distribute(&wrench_matrix(), &DVector::zeros(6));
        assert!(matches!(err, Err(DistributionError::GainsRequired)));

        let mut solver =
            TensionDistributor::new(params(), Mode::MinNorm, DistributorOptions::default()).unwrap();
        let err = solver.distribute_with_gains(
            &wrench_matrix(),
            &DVector::zeros(6),
            &DVector::zeros(6),
            &DVector::zeros(6),
        );
        assert!(matches!(err, Err(DistributionError::GainsNotSupported)));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut solver =
            TensionDistributor::new(params(), Mode::MinNorm, DistributorOptions::default()).unwrap();
        let bad_matrix = DMatrix::zeros(6, 7);
        assert!(matches!(
            solver.distribute(&bad_matrix, &DVector::zeros(6)),
            Err(DistributionError::WrenchMatrixShape { .. })
        ));
        assert!(matches!(
            solver.distribute(&wrench_matrix(), &DVector::zeros(5)),
            Err(DistributionError::WrenchLength { len: 5 })
        ));
    }

    #[test]
    fn test_unconstrained_reports_violations() {
        let mut solver =
            TensionDistributor::new(params(), Mode::Unconstrained, DistributorOptions::default())
                .unwrap();
        // 200 N on a component only cable 2 can carry.
        let mut wrench = DVector::zeros(6);
        wrench[2] = 200.0;
        let result = solver.distribute(&wrench_matrix(), &wrench).unwrap();
        assert_eq!(result.status, SolveStatus::BoundsViolated);
        assert_eq!(solver.bound_violations(&result.tensions), vec![2]);
    }

    #[test]
    fn test_mode_accessor() {
        let solver =
            TensionDistributor::new(params(), Mode::ClosedForm, DistributorOptions::default())
                .unwrap();
        assert_eq!(solver.mode(), Mode::ClosedForm);
    }
}
