//! FFT convolution and deconvolution of a signal with an odd-length response.
//!
//! The response is centered on its middle sample and wrapped around index 0
//! of a zero-padded buffer of `M ≥ N + R` points (power of two, at least 16),
//! so the output stays aligned with the signal's x column and circular
//! wrap-around never reaches it.

use rustfft::num_complex::Complex;
use tracing::debug;

use crate::domain::{Dataset, FftDirection};
use crate::error::{AnalysisError, ErrorKind, Result};
use crate::math::{ensure_finite, is_odd, padded_length};
use crate::signal::fft::{complex_buffer, transform};

const MIN_PADDED: usize = 16;
/// Response bins below this fraction of the largest one count as zero.
const ZERO_SPECTRUM_RTOL: f64 = 1e-12;

/// Size first, then parity.
fn check_response(signal: &Dataset, response: &Dataset, op: &str) -> Result<()> {
    ensure_finite(signal, op)?;
    ensure_finite(response, op)?;
    let (n, r) = (signal.len(), response.len());
    if 2 * r >= n {
        return Err(AnalysisError::new(
            op,
            ErrorKind::ResponseSize {
                signal: signal.name().to_string(),
                response: response.name().to_string(),
                signal_len: n,
                response_len: r,
            },
        ));
    }
    if !is_odd(r) {
        return Err(AnalysisError::new(
            op,
            ErrorKind::ResponseParity {
                signal: signal.name().to_string(),
                response: response.name().to_string(),
                response_len: r,
            },
        ));
    }
    Ok(())
}

/// Spectra of the zero-padded signal and of the wrapped response.
fn spectra(signal: &Dataset, response: &Dataset, op: &str) -> Result<(Vec<Complex<f64>>, Vec<Complex<f64>>)> {
    let (n, r) = (signal.len(), response.len());
    let m = padded_length(n + r, MIN_PADDED);

    let mut sig = complex_buffer(m, op)?;
    for (c, &y) in sig.iter_mut().zip(signal.y()) {
        *c = Complex::new(y, 0.0);
    }
    let mut resp = complex_buffer(m, op)?;
    let center = r / 2;
    for (j, &y) in response.y().iter().enumerate() {
        let idx = if j >= center { j - center } else { m - (center - j) };
        resp[idx] = Complex::new(y, 0.0);
    }
    debug!(n, r, padded = m, "convolution buffers");

    transform(&mut sig, FftDirection::Forward, op)?;
    transform(&mut resp, FftDirection::Forward, op)?;
    Ok((sig, resp))
}

fn back_to_signal(mut buf: Vec<Complex<f64>>, signal: &Dataset, op: &str) -> Result<Dataset> {
    transform(&mut buf, FftDirection::Inverse, op)?;
    Dataset::new(
        format!("{op} of {}", signal.name()),
        signal.x().to_vec(),
        buf.iter().take(signal.len()).map(|c| c.re).collect(),
    )
}

/// Convolve `signal` with `response`.
///
/// The response must have an odd number of points, fewer than half of the
/// signal's.
#[tracing::instrument(skip_all, fields(signal = signal.name(), response = response.name()))]
pub fn convolve(signal: &Dataset, response: &Dataset) -> Result<Dataset> {
    const OP: &str = "Convolution";
    check_response(signal, response, OP)?;
    let (mut sig, resp) = spectra(signal, response, OP)?;
    for (s, h) in sig.iter_mut().zip(&resp) {
        *s *= h;
    }
    back_to_signal(sig, signal, OP)
}

/// Undo a convolution by `response`. Fails when the response spectrum
/// vanishes at some frequency.
#[tracing::instrument(skip_all, fields(signal = signal.name(), response = response.name()))]
pub fn deconvolve(signal: &Dataset, response: &Dataset) -> Result<Dataset> {
    const OP: &str = "Deconvolution";
    check_response(signal, response, OP)?;
    let (mut sig, resp) = spectra(signal, response, OP)?;
    let peak = resp.iter().map(|h| h.norm()).fold(0.0, f64::max);
    if let Some(bin) = resp.iter().position(|h| h.norm() <= ZERO_SPECTRUM_RTOL * peak) {
        return Err(AnalysisError::new(OP, ErrorKind::ResponseSpectrumZero { bin }));
    }
    for (s, h) in sig.iter_mut().zip(&resp) {
        *s /= h;
    }
    back_to_signal(sig, signal, OP)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn values(name: &str, y: Vec<f64>) -> Dataset {
        Dataset::from_values(name, y).unwrap()
    }

    /// A pulse train away from both ends.
    fn pulses() -> Dataset {
        let mut y = vec![0.0; 40];
        y[10] = 1.0;
        y[11] = 2.0;
        y[25] = -1.5;
        values("Signal", y)
    }

    #[test]
    fn size_is_checked_before_parity() {
        for n in [4usize, 9, 10, 21] {
            let signal = values("Signal", vec![1.0; n]);
            for r in 1..n {
                let response = values("Kernel", vec![1.0; r]);
                let result = convolve(&signal, &response);
                if 2 * r >= n {
                    assert!(
                        matches!(result.unwrap_err().kind(), ErrorKind::ResponseSize { .. }),
                        "n={n} r={r}"
                    );
                } else if r % 2 == 0 {
                    assert!(
                        matches!(result.unwrap_err().kind(), ErrorKind::ResponseParity { .. }),
                        "n={n} r={r}"
                    );
                } else {
                    assert!(result.is_ok(), "n={n} r={r}");
                }
            }
        }
    }

    #[test]
    fn errors_name_both_datasets() {
        let err = convolve(&values("Signal", vec![0.0; 10]), &values("Kernel", vec![1.0; 2])).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::ResponseParity {
                signal: "Signal".into(),
                response: "Kernel".into(),
                response_len: 2
            }
        );
    }

    #[test]
    fn convolution_spreads_each_sample_around_itself() {
        let kernel = values("Kernel", vec![0.2, 0.6, 0.2]);
        let out = convolve(&pulses(), &kernel).unwrap();
        assert_eq!(out.name(), "Convolution of Signal");
        assert_eq!(out.len(), 40);
        assert_eq!(out.x(), pulses().x());
        let y = out.y();
        assert_abs_diff_eq!(y[9], 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(y[10], 0.6 + 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(y[11], 0.2 + 1.2, epsilon = 1e-12);
        assert_abs_diff_eq!(y[12], 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(y[25], -0.9, epsilon = 1e-12);
        assert_abs_diff_eq!(y[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn deconvolution_undoes_convolution() {
        let kernel = values("Kernel", vec![0.2, 0.6, 0.2]);
        let blurred = convolve(&pulses(), &kernel).unwrap();
        let restored = deconvolve(&blurred, &kernel).unwrap();
        for (a, b) in restored.y().iter().zip(pulses().y()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn vanishing_response_spectrum_is_reported() {
        // 0.5 + 0.5·cos(2πk/M) is zero at the Nyquist bin.
        let kernel = values("Kernel", vec![0.25, 0.5, 0.25]);
        let err = deconvolve(&pulses(), &kernel).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ResponseSpectrumZero { bin: 32 });
    }
}
