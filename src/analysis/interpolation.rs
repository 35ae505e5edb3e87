//! Piecewise-cubic interpolation: linear, natural cubic spline and Akima.
//!
//! Every scheme is stored the same way, as per-interval coefficients
//!
//! ```text
//! s(t) = y_i + b_i·d + c_i·d² + d_i·d³,   d = t - x_i,   x_i ≤ t ≤ x_{i+1}
//! ```
//!
//! Akima uses the non-rounded variant: the end slopes are extrapolated
//! linearly from the first and last two secants, without corner rounding.

use tracing::debug;

use crate::domain::{Dataset, InterpolationConfig, InterpolationMethod};
use crate::error::{AnalysisError, ErrorKind, Result};
use crate::math::{alloc_buffer, ensure_finite, ensure_min_points, ensure_unique_sorted, sorted_columns};

/// A curve that can be evaluated anywhere in `[x_0, x_{n-1}]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolant {
    method: InterpolationMethod,
    x: Vec<f64>,
    y: Vec<f64>,
    coeffs: Vec<[f64; 3]>,
}

impl Interpolant {
    /// Build from a curve, sorting it by x first.
    ///
    /// Fails on repeated x values or when the curve has fewer points than the
    /// method needs.
    pub fn from_dataset(data: &Dataset, method: InterpolationMethod, operation: &str) -> Result<Self> {
        ensure_finite(data, operation)?;
        let (x, y) = sorted_columns(data);
        ensure_unique_sorted(&x, data.name(), operation)?;
        ensure_min_points(x.len(), method.min_points(), operation)?;
        let coeffs = match method {
            InterpolationMethod::Linear => linear(&x, &y),
            InterpolationMethod::Cubic => natural_cubic(&x, &y),
            InterpolationMethod::Akima => akima(&x, &y),
        };
        Ok(Self { method, x, y, coeffs })
    }

    pub fn method(&self) -> InterpolationMethod {
        self.method
    }

    /// Sorted abscissae.
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn x_range(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    /// Value at `t`; outside the data the end intervals are extended.
    pub fn eval(&self, t: f64) -> f64 {
        let i = self
            .x
            .partition_point(|&v| v <= t)
            .saturating_sub(1)
            .min(self.coeffs.len() - 1);
        let d = t - self.x[i];
        let [b, c, e] = self.coeffs[i];
        self.y[i] + d * (b + d * (c + d * e))
    }
}

fn secants(x: &[f64], y: &[f64]) -> Vec<f64> {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xw, yw)| (yw[1] - yw[0]) / (xw[1] - xw[0]))
        .collect()
}

fn linear(x: &[f64], y: &[f64]) -> Vec<[f64; 3]> {
    secants(x, y).into_iter().map(|m| [m, 0.0, 0.0]).collect()
}

/// Natural spline: zero second derivative at both ends.
fn natural_cubic(x: &[f64], y: &[f64]) -> Vec<[f64; 3]> {
    let n = x.len();
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let m = secants(x, y);

    // Tridiagonal system for the interior second derivatives (Thomas algorithm).
    let mut second = vec![0.0; n];
    let inner = n - 2;
    let mut diag = vec![0.0; inner];
    let mut rhs = vec![0.0; inner];
    for k in 0..inner {
        diag[k] = 2.0 * (h[k] + h[k + 1]);
        rhs[k] = 6.0 * (m[k + 1] - m[k]);
    }
    for k in 1..inner {
        let w = h[k] / diag[k - 1];
        diag[k] -= w * h[k];
        rhs[k] -= w * rhs[k - 1];
    }
    for k in (0..inner).rev() {
        let upper = if k + 1 < inner { h[k + 1] * second[k + 2] } else { 0.0 };
        second[k + 1] = (rhs[k] - upper) / diag[k];
    }

    (0..n - 1)
        .map(|i| {
            [
                m[i] - h[i] * (2.0 * second[i] + second[i + 1]) / 6.0,
                second[i] / 2.0,
                (second[i + 1] - second[i]) / (6.0 * h[i]),
            ]
        })
        .collect()
}

fn akima(x: &[f64], y: &[f64]) -> Vec<[f64; 3]> {
    let n = x.len();
    let s = secants(x, y);
    // Secants padded with two extrapolated values on each side: m[k + 2] = s[k].
    let mut m = Vec::with_capacity(n + 3);
    m.push(3.0 * s[0] - 2.0 * s[1]);
    m.push(2.0 * s[0] - s[1]);
    m.extend_from_slice(&s);
    m.push(2.0 * s[n - 2] - s[n - 3]);
    m.push(3.0 * s[n - 2] - 2.0 * s[n - 3]);

    let slopes: Vec<f64> = (0..n)
        .map(|i| {
            let (m0, m1, m2, m3) = (m[i], m[i + 1], m[i + 2], m[i + 3]);
            let w1 = (m3 - m2).abs();
            let w2 = (m1 - m0).abs();
            if w1 + w2 == 0.0 {
                0.5 * (m1 + m2)
            } else {
                (w1 * m1 + w2 * m2) / (w1 + w2)
            }
        })
        .collect();

    (0..n - 1)
        .map(|i| {
            let h = x[i + 1] - x[i];
            [
                slopes[i],
                (3.0 * s[i] - 2.0 * slopes[i] - slopes[i + 1]) / h,
                (slopes[i] + slopes[i + 1] - 2.0 * s[i]) / (h * h),
            ]
        })
        .collect()
}

/// Resample a curve at `config.points` evenly spaced abscissae over
/// `config.range`, which must lie inside the curve's x range.
#[tracing::instrument(skip_all, fields(dataset = data.name(), method = config.method.label()))]
pub fn interpolate(data: &Dataset, config: &InterpolationConfig) -> Result<Dataset> {
    const OP: &str = "Interpolation";
    config.validate()?;
    let spline = Interpolant::from_dataset(data, config.method, OP)?;
    let (from, to) = config.range.resolve(data, OP)?;
    let (lo, hi) = spline.x_range();
    if from < lo || to > hi {
        return Err(AnalysisError::new(OP, ErrorKind::InvalidRange { from, to }));
    }

    let n = config.points;
    let step = (to - from) / (n - 1) as f64;
    let mut x = alloc_buffer(n, OP)?;
    let mut y = alloc_buffer(n, OP)?;
    for i in 0..n {
        // Pin the last abscissa so rounding never leaves the range.
        x[i] = if i + 1 == n { to } else { from + step * i as f64 };
        y[i] = spline.eval(x[i]);
    }
    debug!(points = n, from, to, "resampled");
    Dataset::new(
        format!("{} Interpolation of {}", config.method.label(), data.name()),
        x,
        y,
    )
}
