//! Feasible-polytope barycenter method.
//!
//! The tension solutions of W·tau = w form an affine subspace
//! p + ker(W); intersecting it with the tension box leaves a convex
//! polytope. This module projects that polytope onto a 2-dimensional
//! redundancy slice, enumerates its vertices as intersections of the
//! projected bound lines, and places the solution at the polygon
//! centroid, the point farthest from saturating any cable.
//!
//! The projection is exactly 2-D, so the method is restricted to robots
//! with redundancy order 2 (8 cables); the distributor enforces that at
//! construction.

extern crate nalgebra as na;
use na::{DMatrix, DVector, Matrix2, Vector2};

use crate::distribution::SolveStatus;
use crate::linalg::{kernel_basis, pseudo_inverse};
use crate::parameters::RobotParameters;
use crate::telemetry::TelemetrySink;

/// Tolerance on the polytope membership test, on both sides of each
/// bound. Too tight rejects true vertices touched by rounding, too loose
/// admits points outside the polytope.
pub const MEMBERSHIP_TOLERANCE: f64 = 1e-3;

/// Determinant cutoff below which a pair of projected rows is treated as
/// parallel and skipped.
const PARALLEL_CUTOFF: f64 = 1e-12;

/// Scratch state of the barycenter method, owned by the distributor's
/// barycenter variant and refilled every cycle.
pub struct PolytopeState {
    /// Kernel basis of W, one column per redundancy dimension (n x 2).
    kernel: DMatrix<f64>,
    /// Particular solution p = W⁺·w.
    particular: DVector<f64>,
    /// Projected lower bounds: tauMin − p[i].
    lower: DVector<f64>,
    /// Projected upper bounds: tauMax − p[i].
    upper: DVector<f64>,
    /// Vertices accepted in the last cycle, kept for inspection.
    vertices: Vec<Vector2<f64>>,
    /// Membership tolerance, [`MEMBERSHIP_TOLERANCE`] unless tuned.
    pub tolerance: f64,
}

impl PolytopeState {
    pub fn new(params: &RobotParameters) -> Self {
        let n = params.cables;
        PolytopeState {
            kernel: DMatrix::zeros(n, 2),
            particular: DVector::zeros(n),
            lower: DVector::zeros(n),
            upper: DVector::zeros(n),
            vertices: Vec::new(),
            tolerance: MEMBERSHIP_TOLERANCE,
        }
    }

    /// One cycle of the barycenter distribution. Publishes the projected
    /// geometry through the telemetry sink before enumerating vertices.
    pub fn solve(
        &mut self,
        params: &RobotParameters,
        w_matrix: &DMatrix<f64>,
        wrench: &DVector<f64>,
        telemetry: &dyn TelemetrySink,
    ) -> (DVector<f64>, SolveStatus) {
        let n = params.cables;

        let pinv = match pseudo_inverse(w_matrix) {
            Ok(pinv) => pinv,
            Err(msg) => {
                tracing::warn!(error = msg, "wrench matrix pseudo-inverse failed");
                return (self.particular.clone(), SolveStatus::NonConvergent);
            }
        };
        self.particular = pinv * wrench;

        match kernel_basis(w_matrix, 2) {
            Ok(kernel) => self.kernel = kernel,
            Err(msg) => {
                tracing::warn!(error = msg, "kernel basis of the wrench matrix failed");
                return (self.particular.clone(), SolveStatus::NonConvergent);
            }
        }

        for i in 0..n {
            self.lower[i] = params.tau_min - self.particular[i];
            self.upper[i] = params.tau_max - self.particular[i];
        }

        // Geometry frame for plotting: per cable the two projection
        // coefficients and the two bounds.
        let mut frame = Vec::with_capacity(4 * n);
        for i in 0..n {
            frame.push(self.kernel[(i, 0)] as f32);
            frame.push(self.kernel[(i, 1)] as f32);
            frame.push(self.lower[i] as f32);
            frame.push(self.upper[i] as f32);
        }
        telemetry.publish(&frame);

        self.vertices = enumerate_vertices(&self.kernel, &self.lower, &self.upper, self.tolerance);
        if self.vertices.is_empty() {
            tracing::warn!("feasible polytope has no vertices, falling back to the particular solution");
            return (self.particular.clone(), SolveStatus::EmptyPolytope);
        }

        let centroid = polygon_centroid(&self.vertices);
        let centroid = DVector::from_column_slice(&[centroid.x, centroid.y]);
        let tau = &self.particular + &self.kernel * centroid;
        (tau, SolveStatus::Optimal)
    }

    /// Vertices accepted in the last cycle.
    pub fn vertices(&self) -> &[Vector2<f64>] {
        &self.vertices
    }
}

/// Enumerates the vertices of the 2-D region lower[i] ≤ H[i]·λ ≤ upper[i].
///
/// Every unordered pair of rows contributes up to four candidate
/// intersections (one per combination of their bounds); a candidate is a
/// vertex only if it satisfies every row's bounds within the tolerance.
/// Pairs of parallel rows have no isolated intersection and are skipped.
pub fn enumerate_vertices(
    h: &DMatrix<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    tolerance: f64,
) -> Vec<Vector2<f64>> {
    let n = h.nrows();
    let mut vertices = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let pair = Matrix2::new(h[(i, 0)], h[(i, 1)], h[(j, 0)], h[(j, 1)]);
            if pair.determinant().abs() < PARALLEL_CUTOFF {
                tracing::debug!(rows = ?(i, j), "skipping parallel projection rows");
                continue;
            }
            let Some(inverse) = pair.try_inverse() else {
                tracing::debug!(rows = ?(i, j), "skipping singular projection pair");
                continue;
            };
            for &u in &[lower[i], upper[i]] {
                for &v in &[lower[j], upper[j]] {
                    let lambda = inverse * Vector2::new(u, v);
                    if inside(h, lower, upper, &lambda, tolerance) {
                        vertices.push(lambda);
                    }
                }
            }
        }
    }
    vertices
}

fn inside(
    h: &DMatrix<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    lambda: &Vector2<f64>,
    tolerance: f64,
) -> bool {
    for k in 0..h.nrows() {
        let projected = h[(k, 0)] * lambda.x + h[(k, 1)] * lambda.y;
        if projected < lower[k] - tolerance || projected > upper[k] + tolerance {
            return false;
        }
    }
    true
}

/// Centroid of the vertex set. One or two vertices average directly; more
/// are sorted clockwise around the arithmetic mean and run through the
/// shoelace summation for the true polygon centroid. A degenerate
/// (collinear) vertex set keeps the arithmetic mean.
pub fn polygon_centroid(vertices: &[Vector2<f64>]) -> Vector2<f64> {
    let mut mean = Vector2::zeros();
    for vertex in vertices {
        mean += vertex;
    }
    mean /= vertices.len() as f64;
    if vertices.len() <= 2 {
        return mean;
    }

    let mut ordered = vertices.to_vec();
    ordered.sort_by(|p, q| {
        let angle_p = (p.y - mean.y).atan2(p.x - mean.x);
        let angle_q = (q.y - mean.y).atan2(q.x - mean.x);
        angle_q.total_cmp(&angle_p)
    });
    ordered.push(ordered[0]);

    let mut doubled_area = 0.0;
    let mut weighted = Vector2::zeros();
    for k in 1..ordered.len() {
        let cross = ordered[k - 1].x * ordered[k].y - ordered[k].x * ordered[k - 1].y;
        doubled_area += cross;
        weighted.x += cross * (ordered[k - 1].x + ordered[k].x);
        weighted.y += cross * (ordered[k - 1].y + ordered[k].y);
    }
    if doubled_area.abs() < 1e-12 {
        return mean;
    }
    weighted / (3.0 * doubled_area)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_vertices_recovered() {
        // Identity projection of the unit square: the enumeration must
        // find exactly the four corners.
        let h = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let lower = DVector::from_column_slice(&[0.0, 0.0]);
        let upper = DVector::from_column_slice(&[1.0, 1.0]);
        let vertices = enumerate_vertices(&h, &lower, &upper, MEMBERSHIP_TOLERANCE);
        assert_eq!(vertices.len(), 4);
        for corner in [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]] {
            assert!(
                vertices
                    .iter()
                    .any(|v| (v.x - corner[0]).abs() < 1e-9 && (v.y - corner[1]).abs() < 1e-9),
                "corner {:?} not found",
                corner
            );
        }
        let centroid = polygon_centroid(&vertices);
        assert!((centroid.x - 0.5).abs() < 1e-3);
        assert!((centroid.y - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_candidates_outside_other_rows_rejected() {
        // A third row cuts the unit square in half: corners above the cut
        // must disappear and new intersections appear on it.
        let h = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let lower = DVector::from_column_slice(&[0.0, 0.0, 0.0]);
        let upper = DVector::from_column_slice(&[1.0, 1.0, 1.0]);
        let vertices = enumerate_vertices(&h, &lower, &upper, 1e-9);
        // (1,1) violates x + y <= 1 and must not be present.
        assert!(
            !vertices
                .iter()
                .any(|v| (v.x - 1.0).abs() < 1e-6 && (v.y - 1.0).abs() < 1e-6)
        );
        // The triangle corners (0,0), (1,0), (0,1) must all be present.
        for corner in [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]] {
            assert!(
                vertices
                    .iter()
                    .any(|v| (v.x - corner[0]).abs() < 1e-6 && (v.y - corner[1]).abs() < 1e-6),
                "corner {:?} not found",
                corner
            );
        }
    }

    #[test]
    fn test_parallel_rows_are_skipped() {
        let h = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 2.0, 0.0]);
        let lower = DVector::from_column_slice(&[0.0, 0.0]);
        let upper = DVector::from_column_slice(&[1.0, 1.0]);
        let vertices = enumerate_vertices(&h, &lower, &upper, MEMBERSHIP_TOLERANCE);
        assert!(vertices.is_empty());
    }

    #[test]
    fn test_empty_polytope_falls_back_to_particular() {
        use crate::parameters::RobotParameters;
        use crate::telemetry::NullTelemetry;

        let p = RobotParameters::new(8, 16.0, 0.0, 10.0).unwrap();
        // Columns e1..e6 plus duplicated e1, e2: kernel of dimension 2.
        let mut w_matrix = DMatrix::zeros(6, 8);
        for i in 0..6 {
            w_matrix[(i, i)] = 1.0;
        }
        w_matrix[(0, 6)] = 1.0;
        w_matrix[(1, 7)] = 1.0;
        // 20 N on the third component, carried by cable 2 alone and
        // outside the kernel: no point of the affine solution space fits
        // the box, so the polytope has no vertices.
        let wrench = DVector::from_column_slice(&[10.0, 10.0, 20.0, 5.0, 5.0, 5.0]);

        let mut state = PolytopeState::new(&p);
        let (tau, status) = state.solve(&p, &w_matrix, &wrench, &NullTelemetry);
        assert_eq!(status, SolveStatus::EmptyPolytope);
        assert!(state.vertices().is_empty());
        // The fallback is the particular solution, uncorrected.
        assert!((tau[2] - 20.0).abs() < 1e-9);
        assert!((&w_matrix * &tau - &wrench).norm() < 1e-9);
    }

    #[test]
    fn test_square_centroid() {
        let vertices = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(2.0, 0.0),
            Vector2::new(2.0, 2.0),
            Vector2::new(0.0, 2.0),
        ];
        let centroid = polygon_centroid(&vertices);
        assert!((centroid.x - 1.0).abs() < 1e-6);
        assert!((centroid.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_equilateral_triangle_centroid() {
        let height = 3.0f64.sqrt() / 2.0;
        let vertices = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.5, height),
        ];
        let centroid = polygon_centroid(&vertices);
        assert!((centroid.x - 0.5).abs() < 1e-6);
        assert!((centroid.y - height / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_two_vertices_average() {
        let vertices = vec![Vector2::new(0.0, 0.0), Vector2::new(2.0, 4.0)];
        let centroid = polygon_centroid(&vertices);
        assert!((centroid.x - 1.0).abs() < 1e-12);
        assert!((centroid.y - 2.0).abs() < 1e-12);
    }
}
