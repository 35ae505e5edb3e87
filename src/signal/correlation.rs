//! Cross- and autocorrelation through the FFT.
//!
//! ```text
//! c[lag] = Σ_i a[i + lag] · b[i]
//! ```
//!
//! Linear correlation zero-pads both curves to `M`, the smallest power of two
//! that is `≥ 2·max(N₁, N₂)`, so no lag wraps around; the output has `M`
//! points with the lag running from `-M/2` to `M/2 - 1`. Circular correlation
//! pads only to `N = max(N₁, N₂)` and treats both curves as periodic; its lag
//! runs from `0` to `N - 1`. The lag axis is scaled by the sampling interval.

use rustfft::num_complex::Complex;
use tracing::debug;

use crate::domain::{CorrelationConfig, CorrelationKind, CorrelationNorm, Dataset, FftDirection};
use crate::error::Result;
use crate::math::{ensure_finite, padded_length};
use crate::signal::fft::{complex_buffer, sampling_interval, transform};

const OP: &str = "Correlation";

fn spectrum(data: &Dataset, m: usize) -> Result<Vec<Complex<f64>>> {
    let mut buf = complex_buffer(m, OP)?;
    for (c, &y) in buf.iter_mut().zip(data.y()) {
        *c = Complex::new(y, 0.0);
    }
    transform(&mut buf, FftDirection::Forward, OP)?;
    Ok(buf)
}

/// Buffer length for the transform.
fn buffer_len(kind: CorrelationKind, n: usize) -> usize {
    match kind {
        CorrelationKind::Linear => padded_length(2 * n, 2),
        CorrelationKind::Circular => n,
    }
}

/// Inverse-transform the cross spectrum and lay it out against the lag.
///
/// `n` is the longer input length, `energy` is `Σa²·Σb²`.
fn lagged(
    name: String,
    mut buf: Vec<Complex<f64>>,
    n: usize,
    energy: f64,
    dt: f64,
    config: &CorrelationConfig,
) -> Result<Dataset> {
    transform(&mut buf, FftDirection::Inverse, OP)?;
    let m = buf.len();
    let lags: Vec<i64> = match config.kind {
        CorrelationKind::Linear => {
            buf.rotate_right(m / 2);
            let half = (m / 2) as i64;
            (0..m as i64).map(|k| k - half).collect()
        }
        CorrelationKind::Circular => (0..m as i64).collect(),
    };

    let y = lags
        .iter()
        .zip(&buf)
        .map(|(&lag, c)| {
            let scale = match (config.normalize, config.kind) {
                (CorrelationNorm::None, _) => 1.0,
                (CorrelationNorm::Biased, _) | (CorrelationNorm::Unbiased, CorrelationKind::Circular) => n as f64,
                (CorrelationNorm::Unbiased, CorrelationKind::Linear) => {
                    let overlap = n as i64 - lag.abs();
                    if overlap > 0 { overlap as f64 } else { 1.0 }
                }
                (CorrelationNorm::Coeff, _) => {
                    if energy > 0.0 {
                        energy.sqrt()
                    } else {
                        1.0
                    }
                }
            };
            c.re / scale
        })
        .collect();
    Dataset::new(name, lags.iter().map(|&l| l as f64 * dt).collect(), y)
}

/// Lag step: explicit, else the uniform x spacing, else one sample.
fn lag_step(data: &Dataset, config: &CorrelationConfig) -> f64 {
    match sampling_interval(data, config.sampling_interval, OP) {
        Ok(dt) => dt,
        Err(_) => {
            debug!(dataset = data.name(), "x is not evenly spaced, lag counted in samples");
            1.0
        }
    }
}

fn energy(data: &Dataset) -> f64 {
    data.y().iter().map(|v| v * v).sum()
}

/// Correlate `a` against `b`; the x column of the result is the lag.
///
/// The lag step is `config.sampling_interval`, or the uniform x spacing of
/// `a`, or one sample when `a` is not evenly spaced.
#[tracing::instrument(skip_all, fields(a = a.name(), b = b.name(), kind = ?config.kind))]
pub fn correlate(a: &Dataset, b: &Dataset, config: &CorrelationConfig) -> Result<Dataset> {
    config.validate()?;
    ensure_finite(a, OP)?;
    ensure_finite(b, OP)?;
    let dt = lag_step(a, config);
    let n = a.len().max(b.len());
    let m = buffer_len(config.kind, n);
    debug!(n1 = a.len(), n2 = b.len(), padded = m, dt, "correlation buffers");

    let mut fa = spectrum(a, m)?;
    let fb = spectrum(b, m)?;
    for (x, y) in fa.iter_mut().zip(&fb) {
        *x *= y.conj();
    }
    lagged(
        format!("Correlation of {} and {}", a.name(), b.name()),
        fa,
        n,
        energy(a) * energy(b),
        dt,
        config,
    )
}

#[tracing::instrument(skip_all, fields(dataset = data.name(), kind = ?config.kind))]
pub fn autocorrelate(data: &Dataset, config: &CorrelationConfig) -> Result<Dataset> {
    config.validate()?;
    ensure_finite(data, OP)?;
    let dt = lag_step(data, config);
    let n = data.len();
    let mut f = spectrum(data, buffer_len(config.kind, n))?;
    for x in f.iter_mut() {
        *x = Complex::new(x.norm_sqr(), 0.0);
    }
    let e = energy(data);
    lagged(format!("Autocorrelation of {}", data.name()), f, n, e * e, dt, config)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::math::argmax;

    fn linear() -> CorrelationConfig {
        CorrelationConfig::default()
    }

    fn normalized(normalize: CorrelationNorm) -> CorrelationConfig {
        CorrelationConfig {
            normalize,
            ..CorrelationConfig::default()
        }
    }

    fn zero_lag(out: &Dataset) -> usize {
        out.x().iter().position(|&l| l == 0.0).unwrap()
    }

    #[test]
    fn autocorrelation_peaks_at_zero_lag() {
        let data = Dataset::from_values("Data1", vec![1.0, -2.0, 3.0, 0.5, 1.5]).unwrap();
        let out = autocorrelate(&data, &linear()).unwrap();
        assert_eq!(out.len(), 16);
        assert_eq!(out.x()[0], -8.0);
        assert_eq!(out.x()[15], 7.0);
        let zero = zero_lag(&out);
        assert_abs_diff_eq!(out.y()[zero], 1.0 + 4.0 + 9.0 + 0.25 + 2.25, epsilon = 1e-12);
        assert_eq!(argmax(out.y()), Some(zero));
        // Symmetric in the lag.
        for k in 1..8 {
            assert_abs_diff_eq!(out.y()[zero + k], out.y()[zero - k], epsilon = 1e-12);
        }
    }

    #[test]
    fn delayed_copy_peaks_at_the_delay() {
        let pulse = [0.0, 1.0, 3.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut delayed = [0.0; 10];
        delayed[3..].copy_from_slice(&pulse[..7]);
        let a = Dataset::from_values("Delayed", delayed.to_vec()).unwrap();
        let b = Dataset::from_values("Pulse", pulse.to_vec()).unwrap();

        let out = correlate(&a, &b, &linear()).unwrap();
        assert_eq!(out.name(), "Correlation of Delayed and Pulse");
        let peak = argmax(out.y()).unwrap();
        assert_eq!(out.x()[peak], 3.0);
        assert_abs_diff_eq!(out.y()[peak], 11.0, epsilon = 1e-12);
    }

    #[test]
    fn autocorrelation_matches_self_correlation() {
        let data = Dataset::from_values("Data1", vec![0.3, 1.0, -0.7, 2.0]).unwrap();
        let auto = autocorrelate(&data, &linear()).unwrap();
        let cross = correlate(&data, &data, &linear()).unwrap();
        for (a, b) in auto.y().iter().zip(cross.y()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn lag_axis_uses_the_sampling_interval() {
        let x: Vec<f64> = (0..5).map(|i| i as f64 * 0.5).collect();
        let data = Dataset::new("Half", x, vec![1.0, -2.0, 3.0, 0.5, 1.5]).unwrap();
        let out = autocorrelate(&data, &linear()).unwrap();
        assert_eq!(out.x()[0], -4.0);
        assert_eq!(out.x()[9], 0.5);

        let explicit = CorrelationConfig {
            sampling_interval: Some(2.0),
            ..CorrelationConfig::default()
        };
        let out = autocorrelate(&data, &explicit).unwrap();
        assert_eq!(out.x()[0], -16.0);

        let uneven = Dataset::new("Uneven", vec![0.0, 1.0, 3.0], vec![1.0, 2.0, 3.0]).unwrap();
        let out = autocorrelate(&uneven, &linear()).unwrap();
        assert_eq!(out.x()[0], -4.0);
        let out = autocorrelate(&uneven, &explicit).unwrap();
        assert_eq!(out.x()[0], -8.0);

        let single = Dataset::new("Single", vec![2.0], vec![3.0]).unwrap();
        let out = autocorrelate(&single, &linear()).unwrap();
        assert_abs_diff_eq!(out.y()[zero_lag(&out)], 9.0, epsilon = 1e-12);
    }

    #[test]
    fn normalizations() {
        let data = Dataset::from_values("Data1", vec![1.0, -2.0, 3.0, 0.5, 1.5]).unwrap();

        let out = autocorrelate(&data, &normalized(CorrelationNorm::Coeff)).unwrap();
        assert_abs_diff_eq!(out.y()[zero_lag(&out)], 1.0, epsilon = 1e-12);

        let out = autocorrelate(&data, &normalized(CorrelationNorm::Biased)).unwrap();
        let zero = zero_lag(&out);
        assert_abs_diff_eq!(out.y()[zero], 15.5 / 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.y()[zero + 1], -5.75 / 5.0, epsilon = 1e-12);

        let out = autocorrelate(&data, &normalized(CorrelationNorm::Unbiased)).unwrap();
        assert_abs_diff_eq!(out.y()[zero + 1], -5.75 / 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.y()[zero - 4], 1.5 / 1.0, epsilon = 1e-12);
    }

    #[test]
    fn circular_correlation_wraps_around() {
        let circular = CorrelationConfig {
            kind: CorrelationKind::Circular,
            ..CorrelationConfig::default()
        };
        let a = Dataset::from_values("A", vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Dataset::from_values("B", vec![0.0, 1.0, 0.0, 0.0]).unwrap();
        let out = correlate(&a, &b, &circular).unwrap();
        assert_eq!(out.x(), &[0.0, 1.0, 2.0, 3.0]);
        for (got, want) in out.y().iter().zip([2.0, 3.0, 4.0, 1.0]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
        }
    }
}
