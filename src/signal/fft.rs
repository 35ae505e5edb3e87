//! Forward and inverse discrete Fourier transforms of sampled curves.
//!
//! Bin `k` of an `N`-point transform sits at frequency `k/(N·Δt)` for
//! `k < N - N/2` and at `(k - N)/(N·Δt)` above that. With `shift` the forward
//! output is rotated so frequency 0 is centered, and the inverse expects its
//! input in that centered order.
//!
//! The shared helpers here (complex scratch buffers, in-place transforms,
//! sampling interval lookup) are reused by the FFT filter, FFT smoothing,
//! convolution and correlation.

use rustfft::FftPlanner;
use rustfft::num_complex::Complex;
use tracing::debug;

use crate::domain::{Column, Dataset, FftConfig, FftDirection, Table};
use crate::error::{AnalysisError, ErrorKind, Result};
use crate::math::{ensure_finite, ensure_min_points, uniform_spacing};

/// Zero-filled complex scratch buffer.
pub(crate) fn complex_buffer(len: usize, operation: &str) -> Result<Vec<Complex<f64>>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| AnalysisError::new(operation, ErrorKind::AllocationFailure { len }))?;
    buf.resize(len, Complex::new(0.0, 0.0));
    Ok(buf)
}

/// Transform `buf` in place. The inverse is normalized by `1/N`.
pub(crate) fn transform(buf: &mut [Complex<f64>], direction: FftDirection, operation: &str) -> Result<()> {
    let n = buf.len();
    if n == 0 {
        return Err(AnalysisError::new(
            operation,
            ErrorKind::TransformError {
                reason: "empty input".to_string(),
            },
        ));
    }
    let mut planner = FftPlanner::<f64>::new();
    match direction {
        FftDirection::Forward => planner.plan_fft_forward(n).process(buf),
        FftDirection::Inverse => {
            planner.plan_fft_inverse(n).process(buf);
            let norm = 1.0 / n as f64;
            for c in buf.iter_mut() {
                *c *= norm;
            }
        }
    }
    if buf.iter().any(|c| !(c.re.is_finite() && c.im.is_finite())) {
        return Err(AnalysisError::new(
            operation,
            ErrorKind::TransformError {
                reason: format!("non-finite output of the {n}-point transform"),
            },
        ));
    }
    Ok(())
}

/// Explicit sampling interval, or the uniform spacing of `x`.
pub(crate) fn sampling_interval(data: &Dataset, explicit: Option<f64>, operation: &str) -> Result<f64> {
    if let Some(dt) = explicit {
        return Ok(dt);
    }
    uniform_spacing(data.x()).ok_or_else(|| {
        AnalysisError::new(
            operation,
            ErrorKind::NonUniformSampling {
                dataset: data.name().to_string(),
            },
        )
    })
}

/// Signed bin index: `k` below the Nyquist split, `k - N` above it.
pub(crate) fn signed_bin(k: usize, n: usize) -> f64 {
    if k < n - n / 2 {
        k as f64
    } else {
        k as f64 - n as f64
    }
}

/// Absolute frequency of bin `k`, `min(k, N-k)/(N·Δt)`.
pub(crate) fn bin_frequency(k: usize, n: usize, dt: f64) -> f64 {
    k.min(n - k) as f64 / (n as f64 * dt)
}

/// Transform a curve.
///
/// `imaginary` optionally supplies the imaginary part of the input; the real
/// part is the curve's y column. The returned table has an axis column
/// ("Frequency" forward, "Time" inverse) followed by "Real", "Imaginary",
/// "Amplitude" and "Angle" (radians).
#[tracing::instrument(skip_all, fields(dataset = data.name(), direction = ?config.direction))]
pub fn fft(data: &Dataset, imaginary: Option<&[f64]>, config: &FftConfig) -> Result<Table> {
    const OP: &str = "FFT";
    config.validate()?;
    ensure_finite(data, OP)?;
    let n = data.len();
    ensure_min_points(n, 2, OP)?;
    if let Some(im) = imaginary {
        if im.len() != n {
            return Err(AnalysisError::new(
                OP,
                ErrorKind::LengthMismatch { x: n, y: im.len() },
            ));
        }
        if im.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::new(
                OP,
                ErrorKind::NonFiniteData {
                    dataset: data.name().to_string(),
                },
            ));
        }
    }

    let mut buf = complex_buffer(n, OP)?;
    for (i, c) in buf.iter_mut().enumerate() {
        *c = Complex::new(data.y()[i], imaginary.map_or(0.0, |im| im[i]));
    }

    let (axis_name, axis, amplitude_scale) = match config.direction {
        FftDirection::Forward => {
            let dt = sampling_interval(data, config.sampling_interval, OP)?;
            transform(&mut buf, FftDirection::Forward, OP)?;
            let df = 1.0 / (n as f64 * dt);
            let mut freq: Vec<f64> = (0..n).map(|k| signed_bin(k, n) * df).collect();
            if config.shift {
                buf.rotate_right(n / 2);
                freq.rotate_right(n / 2);
            }
            let scale = if config.normalize { 1.0 / n as f64 } else { 1.0 };
            debug!(n, dt, df, "forward transform");
            ("Frequency", freq, scale)
        }
        FftDirection::Inverse => {
            let df = match config.sampling_interval {
                Some(df) => df,
                None => {
                    let mut sorted = data.x().to_vec();
                    sorted.sort_by(f64::total_cmp);
                    uniform_spacing(&sorted).ok_or_else(|| {
                        AnalysisError::new(
                            OP,
                            ErrorKind::NonUniformSampling {
                                dataset: data.name().to_string(),
                            },
                        )
                    })?
                }
            };
            if config.shift {
                buf.rotate_left(n / 2);
            }
            transform(&mut buf, FftDirection::Inverse, OP)?;
            let dt = 1.0 / (n as f64 * df);
            debug!(n, df, dt, "inverse transform");
            ("Time", (0..n).map(|k| k as f64 * dt).collect(), 1.0)
        }
    };

    let direction = match config.direction {
        FftDirection::Forward => "Forward",
        FftDirection::Inverse => "Inverse",
    };
    Ok(Table::new(
        format!("{direction} FFT of {}", data.name()),
        vec![
            Column::numeric(axis_name, axis),
            Column::numeric("Real", buf.iter().map(|c| c.re).collect()),
            Column::numeric("Imaginary", buf.iter().map(|c| c.im).collect()),
            Column::numeric("Amplitude", buf.iter().map(|c| c.norm() * amplitude_scale).collect()),
            Column::numeric("Angle", buf.iter().map(|c| c.arg()).collect()),
        ],
    ))
}
