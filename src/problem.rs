//! Builds the fixed-shape optimization matrices for each distribution mode.
//!
//! The problems are stated in bounded least-squares form: minimize
//! ‖Q·x − r‖² subject to A·x = b and C·x ≤ d. Shapes are decided once at
//! construction from the cable count and tension bounds; per-cycle data
//! (the wrench matrix and desired wrench) is copied into the otherwise
//! constant templates by the dispatcher.

extern crate nalgebra as na;
use na::{DMatrix, DVector};

use crate::parameters::RobotParameters;

/// Weight of the (alpha − 1)² penalty in the interpolated formulation.
/// Large enough to pull alpha to 1 whenever the desired wrench is feasible.
pub const ALPHA_WEIGHT: f64 = 7000.0;

/// Bounds on the proportional gain in the gain-augmented formulation.
pub const KP_MIN: f64 = 1.0;
pub const KP_MAX: f64 = 400.0;

/// Bounds on the derivative gain in the gain-augmented formulation.
pub const KD_MIN: f64 = 2.0;
pub const KD_MAX: f64 = 400.0;

/// A bounded least-squares problem: minimize ‖Q·x − r‖² subject to
/// A·x = b and C·x ≤ d.
#[derive(Debug, Clone)]
pub struct QpProblem {
    pub q: DMatrix<f64>,
    pub r: DVector<f64>,
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
    pub c: DMatrix<f64>,
    pub d: DVector<f64>,
}

impl QpProblem {
    /// Dimension of the solution vector x.
    pub fn unknowns(&self) -> usize {
        self.c.ncols()
    }

    /// Number of inequality rows, which is also the length of the active
    /// set the solver is warm-started with.
    pub fn inequality_rows(&self) -> usize {
        self.c.nrows()
    }
}

/// Box constraint on the cable tensions, written as two inequality rows
/// per cable: row i enforces tau[i] ≤ tauMax, row i + n enforces
/// −tau[i] ≤ −tauMin. The matrix is sized for `unknowns` variables so the
/// modes with auxiliary variables can append their own rows after 2n.
fn tension_box(unknowns: usize, params: &RobotParameters) -> (DMatrix<f64>, DVector<f64>) {
    let n = params.cables;
    let mut c = DMatrix::zeros(2 * unknowns, unknowns);
    let mut d = DVector::zeros(2 * unknowns);
    for i in 0..n {
        c[(i, i)] = 1.0;
        d[i] = params.tau_max;
        c[(i + n, i)] = -1.0;
        d[i + n] = -params.tau_min;
    }
    (c, d)
}

/// min ‖tau‖² subject to W·tau = w and the tension box. Assumes the
/// desired wrench is feasible.
pub fn min_norm(params: &RobotParameters) -> QpProblem {
    let n = params.cables;
    let (c, d) = tension_box(n, params);
    QpProblem {
        q: DMatrix::identity(n, n),
        r: DVector::zeros(n),
        a: DMatrix::zeros(6, n),
        b: DVector::zeros(6),
        c,
        d,
    }
}

/// min ‖W·tau − w‖² subject to the tension box only. Does not assume the
/// desired wrench is feasible; Q and r are refreshed from (W, w) each cycle.
pub fn min_wrench_error(params: &RobotParameters) -> QpProblem {
    let n = params.cables;
    let (c, d) = tension_box(n, params);
    QpProblem {
        q: DMatrix::zeros(6, n),
        r: DVector::zeros(6),
        a: DMatrix::zeros(0, n),
        b: DVector::zeros(0),
        c,
        d,
    }
}

/// Interpolated formulation over x = (tau, alpha): min ‖tau‖²/tauMax plus a
/// weighted (alpha − 1)² penalty, subject to
/// W·tau = alpha·w + (1 − alpha)·w_prev and 0 ≤ alpha ≤ 1. When the full
/// desired wrench is infeasible, alpha backs off towards the previous one.
pub fn min_norm_interp(params: &RobotParameters) -> QpProblem {
    let n = params.cables;
    let mut q = DMatrix::identity(n + 1, n + 1) / params.tau_max;
    q[(n, n)] = ALPHA_WEIGHT;
    let mut r = DVector::zeros(n + 1);
    r[n] = ALPHA_WEIGHT;

    let (mut c, mut d) = tension_box(n + 1, params);
    c[(2 * n, n)] = 1.0;
    d[2 * n] = 1.0;
    c[(2 * n + 1, n)] = -1.0;
    d[2 * n + 1] = 0.0;

    QpProblem {
        q,
        r,
        a: DMatrix::zeros(6, n + 1),
        b: DVector::zeros(6),
        c,
        d,
    }
}

/// Gain-augmented formulation over x = (tau, Kp, Kd): min ‖x‖² subject to
/// W·tau − Kp·pe − Kd·ve = w, the tension box, and the gain boxes
/// [KP_MIN, KP_MAX] and [KD_MIN, KD_MAX].
pub fn augmented_gain(params: &RobotParameters) -> QpProblem {
    let n = params.cables;
    let (mut c, mut d) = tension_box(n + 2, params);
    c[(2 * n, n)] = 1.0;
    d[2 * n] = KP_MAX;
    c[(2 * n + 1, n)] = -1.0;
    d[2 * n + 1] = -KP_MIN;
    c[(2 * n + 2, n + 1)] = 1.0;
    d[2 * n + 2] = KD_MAX;
    c[(2 * n + 3, n + 1)] = -1.0;
    d[2 * n + 3] = -KD_MIN;

    QpProblem {
        q: DMatrix::identity(n + 2, n + 2),
        r: DVector::zeros(n + 2),
        a: DMatrix::zeros(6, n + 2),
        b: DVector::zeros(6),
        c,
        d,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RobotParameters {
        RobotParameters::new(8, 100.0, 2.0, 90.0).unwrap()
    }

    #[test]
    fn test_min_norm_shapes() {
        let p = min_norm(&params());
        assert_eq!(p.unknowns(), 8);
        assert_eq!(p.inequality_rows(), 16);
        assert_eq!(p.a.shape(), (6, 8));
        assert_eq!(p.q, DMatrix::identity(8, 8));
    }

    #[test]
    fn test_box_rows_encode_bounds() {
        let p = min_norm(&params());
        for i in 0..8 {
            assert_eq!(p.c[(i, i)], 1.0);
            assert_eq!(p.d[i], 90.0);
            assert_eq!(p.c[(i + 8, i)], -1.0);
            assert_eq!(p.d[i + 8], -2.0);
        }
    }

    #[test]
    fn test_min_wrench_error_has_no_equality() {
        let p = min_wrench_error(&params());
        assert_eq!(p.a.nrows(), 0);
        assert_eq!(p.q.shape(), (6, 8));
    }

    #[test]
    fn test_interp_alpha_rows() {
        let p = min_norm_interp(&params());
        assert_eq!(p.unknowns(), 9);
        assert_eq!(p.inequality_rows(), 18);
        // alpha cost and target
        assert_eq!(p.q[(8, 8)], ALPHA_WEIGHT);
        assert_eq!(p.r[8], ALPHA_WEIGHT);
        // 0 <= alpha <= 1
        assert_eq!(p.c[(16, 8)], 1.0);
        assert_eq!(p.d[16], 1.0);
        assert_eq!(p.c[(17, 8)], -1.0);
        assert_eq!(p.d[17], 0.0);
        // tau cost scaled by the upper bound
        assert!((p.q[(0, 0)] - 1.0 / 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_augmented_gain_rows() {
        let p = augmented_gain(&params());
        assert_eq!(p.unknowns(), 10);
        assert_eq!(p.inequality_rows(), 20);
        assert_eq!(p.d[16], KP_MAX);
        assert_eq!(p.d[17], -KP_MIN);
        assert_eq!(p.d[18], KD_MAX);
        assert_eq!(p.d[19], -KD_MIN);
    }
}
