//! Smoothing: Savitzky–Golay, FFT low-pass and moving average.
//!
//! Savitzky–Golay fits a polynomial of order `p` by least squares to the
//! window `[i - L, i + R]` around every point and takes its value at `x_i`.
//! Windows are clipped at the ends of the curve (the order drops when a clipped
//! window has too few points), and the fit uses the actual x distances, so
//! uneven sampling is handled.

use nalgebra::{DMatrix, DVector};
use rustfft::num_complex::Complex;
use tracing::{debug, info};

use crate::domain::{Dataset, FftDirection, SmoothConfig, SmoothMethod};
use crate::error::Result;
use crate::math::{alloc_buffer, ensure_finite, ensure_min_points, solve_least_squares};
use crate::signal::fft::{complex_buffer, transform};

/// A smoothed curve plus notices about options that had no effect.
#[derive(Debug, Clone, PartialEq)]
pub struct Smoothed {
    pub data: Dataset,
    pub notices: Vec<String>,
}

#[tracing::instrument(skip_all, fields(dataset = data.name(), method = config.method.label()))]
pub fn smooth(data: &Dataset, config: &SmoothConfig) -> Result<Smoothed> {
    let op = config.method.label();
    config.validate()?;
    ensure_finite(data, op)?;

    let notices = config.ignored_options();
    for notice in &notices {
        info!(notice = notice.as_str(), "ignored option");
    }

    let y = match config.method {
        SmoothMethod::SavitzkyGolay => {
            ensure_min_points(data.len(), config.left_points + config.right_points + 1, op)?;
            savitzky_golay(data.x(), data.y(), config, op)?
        }
        SmoothMethod::Fft => {
            ensure_min_points(data.len(), 2, op)?;
            fft_smooth(data.y(), config.points, op)?
        }
        SmoothMethod::MovingAverage => moving_average(data.y(), config.points, op)?,
    };

    Ok(Smoothed {
        data: Dataset::new(format!("{op} of {}", data.name()), data.x().to_vec(), y)?,
        notices,
    })
}

fn savitzky_golay(x: &[f64], y: &[f64], config: &SmoothConfig, op: &str) -> Result<Vec<f64>> {
    let n = y.len();
    let mut out = alloc_buffer(n, op)?;
    for i in 0..n {
        let lo = i.saturating_sub(config.left_points);
        let hi = (i + config.right_points).min(n - 1);
        let count = hi - lo + 1;
        let order = config.order().min(count - 1);

        let scale = (lo..=hi)
            .map(|j| (x[j] - x[i]).abs())
            .fold(0.0, f64::max);
        if scale == 0.0 {
            out[i] = y[i];
            continue;
        }
        let a = DMatrix::from_fn(count, order + 1, |r, k| ((x[lo + r] - x[i]) / scale).powi(k as i32));
        let b = DVector::from_fn(count, |r, _| y[lo + r]);
        out[i] = solve_least_squares(&a, &b).map_or(y[i], |beta| beta[0]);
    }
    Ok(out)
}

/// Keep the lowest `N/points` frequency bins on each side of zero.
fn fft_smooth(y: &[f64], points: usize, op: &str) -> Result<Vec<f64>> {
    let n = y.len();
    let mut buf = complex_buffer(n, op)?;
    for (c, &v) in buf.iter_mut().zip(y) {
        *c = Complex::new(v, 0.0);
    }
    transform(&mut buf, FftDirection::Forward, op)?;
    let keep = n / points;
    for (k, c) in buf.iter_mut().enumerate() {
        if k.min(n - k) > keep {
            *c = Complex::new(0.0, 0.0);
        }
    }
    debug!(n, keep, "fft smoothing cutoff bin");
    transform(&mut buf, FftDirection::Inverse, op)?;
    Ok(buf.iter().map(|c| c.re).collect())
}

/// Centered average over `points` samples, shrinking at the ends.
fn moving_average(y: &[f64], points: usize, op: &str) -> Result<Vec<f64>> {
    let n = y.len();
    let mut prefix = alloc_buffer(n + 1, op)?;
    for (i, &v) in y.iter().enumerate() {
        prefix[i + 1] = prefix[i] + v;
    }
    let left = (points - 1) / 2;
    let right = points / 2;
    let mut out = alloc_buffer(n, op)?;
    for (i, v) in out.iter_mut().enumerate() {
        let lo = i.saturating_sub(left);
        let hi = (i + right).min(n - 1);
        *v = (prefix[hi + 1] - prefix[lo]) / (hi - lo + 1) as f64;
    }
    Ok(out)
}
