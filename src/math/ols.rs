//! Weighted linear least squares and normal-matrix inversion.
//!
//! Models that are linear in their parameters (straight line, polynomials) are
//! solved in closed form:
//!
//! ```text
//! minimize Σ w_i (y_i - x_i^T β)^2
//! ```
//!
//! Rows are scaled by `sqrt(w_i)` and the resulting ordinary least squares
//! problem is solved with SVD, which copes with tall design matrices and
//! nearly collinear columns (high-order polynomials on narrow x ranges).

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if the strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Build the row-weighted design matrix and observation vector.
///
/// `row` fills one design row for abscissa `x`.
pub fn weighted_system<F>(x: &[f64], y: &[f64], sqrt_w: &[f64], cols: usize, mut row: F) -> (DMatrix<f64>, DVector<f64>)
where
    F: FnMut(f64, &mut [f64]),
{
    let n = x.len();
    let mut a = DMatrix::<f64>::zeros(n, cols);
    let mut b = DVector::<f64>::zeros(n);
    let mut buf = vec![0.0; cols];
    for i in 0..n {
        row(x[i], &mut buf);
        for j in 0..cols {
            a[(i, j)] = buf[j] * sqrt_w[i];
        }
        b[i] = y[i] * sqrt_w[i];
    }
    (a, b)
}

/// Covariance estimate `(JᵀJ)⁻¹` from a (weighted) Jacobian.
///
/// Falls back to the SVD pseudo-inverse when `JᵀJ` is singular, so parameters
/// the data cannot pin down get zero variance instead of aborting the fit.
pub fn covariance_from_jacobian(j: &DMatrix<f64>) -> DMatrix<f64> {
    let jtj = j.transpose() * j;
    let p = jtj.nrows();
    if let Some(inv) = jtj.clone().try_inverse() {
        if inv.iter().all(|v| v.is_finite()) {
            return inv;
        }
    }
    jtj.svd(true, true)
        .pseudo_inverse(1e-12)
        .unwrap_or_else(|_| DMatrix::zeros(p, p))
}
