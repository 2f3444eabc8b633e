//! Thin wrappers around the dense linear-algebra primitives the
//! distribution algorithms rely on: pseudo-inverse and null-space basis.
//!
//! All functions are pure; failures come from the underlying SVD or
//! eigendecomposition not converging, or from a matrix not having the
//! expected rank.

extern crate nalgebra as na;
use na::{DMatrix, SymmetricEigen};

/// Relative cutoff below which singular values are treated as zero.
pub const PINV_EPSILON: f64 = 1e-10;

/// Moore-Penrose pseudo-inverse via SVD.
pub fn pseudo_inverse(m: &DMatrix<f64>) -> Result<DMatrix<f64>, &'static str> {
    m.clone().pseudo_inverse(PINV_EPSILON)
}

/// Orthonormal basis of the null space of `m`, returned as a matrix whose
/// `dim` columns span the kernel.
///
/// The basis is obtained from the eigendecomposition of the Gram matrix
/// `mᵀm`: eigenvectors belonging to (numerically) zero eigenvalues span
/// the kernel. Fails if the kernel has lower dimension than requested,
/// which means `m` has higher rank than the caller assumed.
pub fn kernel_basis(m: &DMatrix<f64>, dim: usize) -> Result<DMatrix<f64>, &'static str> {
    let n = m.ncols();
    let gram = m.transpose() * m;
    let eigen = SymmetricEigen::new(gram);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

    // Eigenvalues of the Gram matrix are squared singular values, so the
    // zero test is scaled by the largest one.
    let scale = eigen
        .eigenvalues
        .iter()
        .fold(0.0f64, |acc, &v| acc.max(v.abs()));
    let cutoff = scale * 1e-9;

    let mut basis = DMatrix::zeros(n, dim);
    for (k, &idx) in order.iter().take(dim).enumerate() {
        if eigen.eigenvalues[idx] > cutoff {
            return Err("null space has lower dimension than expected");
        }
        basis.set_column(k, &eigen.eigenvectors.column(idx));
    }
    Ok(basis)
}
