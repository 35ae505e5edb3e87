//! FFT-domain filters: transform, zero the rejected bins, transform back.

use rustfft::num_complex::Complex;
use tracing::debug;

use crate::domain::{Dataset, FftDirection, FilterConfig, FilterKind};
use crate::error::Result;
use crate::math::{ensure_finite, ensure_min_points};
use crate::signal::fft::{bin_frequency, complex_buffer, sampling_interval, transform};

impl FilterKind {
    /// Whether a component at frequency `f` (absolute) passes.
    pub fn passes(&self, f: f64) -> bool {
        match *self {
            FilterKind::LowPass { cutoff } => f <= cutoff,
            FilterKind::HighPass { cutoff } => f >= cutoff,
            FilterKind::BandPass { low, high } => f >= low && f <= high,
            FilterKind::BandBlock { low, high } => f < low || f > high,
        }
    }
}

/// Filter a uniformly sampled curve. The result shares the input's x column
/// and is named "<filter> of <curve>".
#[tracing::instrument(skip_all, fields(dataset = data.name(), filter = config.kind.label()))]
pub fn fft_filter(data: &Dataset, config: &FilterConfig) -> Result<Dataset> {
    let op = config.kind.label();
    config.validate()?;
    ensure_finite(data, op)?;
    let n = data.len();
    ensure_min_points(n, 2, op)?;
    let dt = sampling_interval(data, config.sampling_interval, op)?;

    let mut buf = complex_buffer(n, op)?;
    for (c, &y) in buf.iter_mut().zip(data.y()) {
        *c = Complex::new(y, 0.0);
    }
    transform(&mut buf, FftDirection::Forward, op)?;

    let mut rejected = 0usize;
    for (k, c) in buf.iter_mut().enumerate() {
        let keep = config.kind.passes(bin_frequency(k, n, dt)) || (k == 0 && config.keep_dc_offset);
        if !keep {
            *c = Complex::new(0.0, 0.0);
            rejected += 1;
        }
    }
    debug!(n, dt, rejected, "bins rejected");

    transform(&mut buf, FftDirection::Inverse, op)?;
    Dataset::new(
        format!("{op} of {}", data.name()),
        data.x().to_vec(),
        buf.iter().map(|c| c.re).collect(),
    )
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    use super::*;
    use crate::error::ErrorKind;

    /// Offset 2, a 1 Hz and a 10 Hz component, sampled at 64 Hz for 1 s.
    fn two_tones() -> Dataset {
        let x: Vec<f64> = (0..64).map(|i| i as f64 / 64.0).collect();
        let y = x
            .iter()
            .map(|t| 2.0 + (2.0 * PI * t).sin() + 0.5 * (2.0 * PI * 10.0 * t).sin())
            .collect();
        Dataset::new("Data2", x, y).unwrap()
    }

    #[test]
    fn low_pass_removes_the_fast_tone() {
        let data = two_tones();
        let out = fft_filter(&data, &FilterConfig::new(FilterKind::LowPass { cutoff: 5.0 })).unwrap();
        assert_eq!(out.name(), "Low Pass FFT Filter of Data2");
        assert_eq!(out.x(), data.x());
        for (t, y) in out.points() {
            assert_abs_diff_eq!(y, 2.0 + (2.0 * PI * t).sin(), epsilon = 1e-10);
        }
    }

    #[test]
    fn high_pass_keeps_or_drops_the_offset() {
        let data = two_tones();
        let mut config = FilterConfig::new(FilterKind::HighPass { cutoff: 5.0 });
        let with_dc = fft_filter(&data, &config).unwrap();
        config.keep_dc_offset = false;
        let without_dc = fft_filter(&data, &config).unwrap();
        for ((t, a), b) in with_dc.points().zip(without_dc.y()) {
            let tone = 0.5 * (2.0 * PI * 10.0 * t).sin();
            assert_abs_diff_eq!(a, 2.0 + tone, epsilon = 1e-10);
            assert_abs_diff_eq!(*b, tone, epsilon = 1e-10);
        }
    }

    #[test]
    fn band_block_removes_only_the_band() {
        let data = two_tones();
        let config = FilterConfig::new(FilterKind::BandBlock { low: 0.5, high: 1.5 });
        let out = fft_filter(&data, &config).unwrap();
        for (t, y) in out.points() {
            assert_abs_diff_eq!(y, 2.0 + 0.5 * (2.0 * PI * 10.0 * t).sin(), epsilon = 1e-10);
        }
    }

    #[test]
    fn band_edges_are_validated() {
        let data = two_tones();
        let config = FilterConfig::new(FilterKind::BandPass { low: 3.0, high: 3.0 });
        let err = fft_filter(&data, &config).unwrap_err();
        assert_eq!(err.operation(), "Band Pass FFT Filter");
        assert_eq!(err.kind(), &ErrorKind::InvalidRange { from: 3.0, to: 3.0 });

        let config = FilterConfig::new(FilterKind::LowPass { cutoff: -1.0 });
        let err = fft_filter(&data, &config).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidCutoff { value: -1.0 });
    }
}
