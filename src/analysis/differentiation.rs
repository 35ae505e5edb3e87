//! Numerical derivative of a curve.
//!
//! Interior points take the mean of the backward and forward difference
//! quotients; the first and last points use the one-sided quotient.

use crate::domain::Dataset;
use crate::error::Result;
use crate::math::{alloc_buffer, ensure_finite, ensure_min_points, ensure_unique_sorted, sorted_columns};

#[tracing::instrument(skip_all, fields(dataset = data.name()))]
pub fn differentiate(data: &Dataset) -> Result<Dataset> {
    const OP: &str = "Differentiation";
    ensure_finite(data, OP)?;
    ensure_min_points(data.len(), 3, OP)?;
    let (x, y) = sorted_columns(data);
    ensure_unique_sorted(&x, data.name(), OP)?;

    let n = x.len();
    let slope = |i: usize| (y[i + 1] - y[i]) / (x[i + 1] - x[i]);
    let mut d = alloc_buffer(n, OP)?;
    d[0] = slope(0);
    d[n - 1] = slope(n - 2);
    for i in 1..n - 1 {
        d[i] = 0.5 * (slope(i - 1) + slope(i));
    }
    Dataset::new(format!("Derivative of {}", data.name()), x, d)
}
