//! Shared numeric helpers used by every analysis operation.
//!
//! - fallible buffer allocation (reported as `AllocationFailure`, never a panic)
//! - finiteness, duplicate-abscissa and uniform-spacing checks
//! - sorting a curve by x
//! - small search helpers used by the initial-guess heuristics

use crate::domain::Dataset;
use crate::error::{AnalysisError, ErrorKind, Result};

/// Relative tolerance used when deciding whether x values are evenly spaced.
const SPACING_RTOL: f64 = 1e-4;

/// Allocate a zero-filled buffer of `len` values.
pub fn alloc_buffer(len: usize, operation: &str) -> Result<Vec<f64>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| AnalysisError::new(operation, ErrorKind::AllocationFailure { len }))?;
    buf.resize(len, 0.0);
    Ok(buf)
}

/// Reject datasets containing NaN or infinite values.
pub fn ensure_finite(data: &Dataset, operation: &str) -> Result<()> {
    if data.x().iter().chain(data.y()).all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(AnalysisError::new(
            operation,
            ErrorKind::NonFiniteData {
                dataset: data.name().to_string(),
            },
        ))
    }
}

/// Require at least `required` points.
pub fn ensure_min_points(available: usize, required: usize, operation: &str) -> Result<()> {
    if available < required {
        return Err(AnalysisError::new(
            operation,
            ErrorKind::InsufficientData {
                required,
                available,
            },
        ));
    }
    Ok(())
}

/// Indices that order `x` ascending (stable; NaN-free input assumed).
pub fn sort_indices(x: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..x.len()).collect();
    idx.sort_by(|&a, &b| x[a].partial_cmp(&x[b]).unwrap_or(std::cmp::Ordering::Equal));
    idx
}

/// `(x, y)` columns of a dataset, sorted by x.
pub fn sorted_columns(data: &Dataset) -> (Vec<f64>, Vec<f64>) {
    let idx = sort_indices(data.x());
    let x = idx.iter().map(|&i| data.x()[i]).collect();
    let y = idx.iter().map(|&i| data.y()[i]).collect();
    (x, y)
}

/// Fail if a sorted x column repeats a value.
pub fn ensure_unique_sorted(x: &[f64], dataset: &str, operation: &str) -> Result<()> {
    if let Some(w) = x.windows(2).find(|w| w[1] <= w[0]) {
        return Err(AnalysisError::new(
            operation,
            ErrorKind::DuplicateAbscissa {
                dataset: dataset.to_string(),
                x: w[1],
            },
        ));
    }
    Ok(())
}

/// Sampling interval of an evenly spaced column, or `None` when spacing varies
/// or is not strictly positive.
pub fn uniform_spacing(x: &[f64]) -> Option<f64> {
    if x.len() < 2 {
        return None;
    }
    let step = (x[x.len() - 1] - x[0]) / (x.len() - 1) as f64;
    if !(step.is_finite() && step > 0.0) {
        return None;
    }
    let uniform = x
        .windows(2)
        .all(|w| ((w[1] - w[0]) - step).abs() <= SPACING_RTOL * step);
    uniform.then_some(step)
}

pub fn is_odd(n: usize) -> bool {
    n % 2 == 1
}

/// Smallest power of two that is `>= n` and `>= floor`.
pub fn padded_length(n: usize, floor: usize) -> usize {
    n.max(floor).next_power_of_two()
}

/// Index of the largest value.
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

/// First x (walking from `start` towards lower indices when `leftwards`) where
/// `y` crosses `level`, linearly interpolated between the bracketing samples.
pub fn level_crossing(x: &[f64], y: &[f64], start: usize, level: f64, leftwards: bool) -> Option<f64> {
    let above = |i: usize| y[i] >= level;
    let start_above = above(start);
    let step = |i: usize| -> Option<usize> {
        if leftwards {
            i.checked_sub(1)
        } else if i + 1 < y.len() {
            Some(i + 1)
        } else {
            None
        }
    };

    let mut i = start;
    while let Some(j) = step(i) {
        if above(j) != start_above {
            let dy = y[j] - y[i];
            if dy == 0.0 {
                return Some(x[j]);
            }
            return Some(x[i] + (level - y[i]) * (x[j] - x[i]) / dy);
        }
        i = j;
    }
    None
}

/// Full width at half maximum of the peak at `peak`, measured above `baseline`.
///
/// Falls back to a quarter of the x span when a side never drops below half
/// height.
pub fn full_width_half_max(x: &[f64], y: &[f64], peak: usize, baseline: f64) -> f64 {
    let half = baseline + 0.5 * (y[peak] - baseline);
    let left = level_crossing(x, y, peak, half, true);
    let right = level_crossing(x, y, peak, half, false);
    let span = x[x.len() - 1] - x[0];
    let width = match (left, right) {
        (Some(l), Some(r)) => r - l,
        (Some(l), None) => 2.0 * (x[peak] - l),
        (None, Some(r)) => 2.0 * (r - x[peak]),
        (None, None) => 0.25 * span,
    };
    if width.is_finite() && width > 0.0 {
        width
    } else {
        0.25 * span.abs().max(f64::EPSILON)
    }
}
