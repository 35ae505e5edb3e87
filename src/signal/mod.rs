//! Signal processing on sampled curves.
//!
//! - `fft`: forward/inverse transforms and the shared FFT helpers
//! - `filter`: low-pass, high-pass, band-pass and band-block FFT filters
//! - `smooth`: Savitzky–Golay, FFT and moving-average smoothing
//! - `convolution`: convolution and deconvolution with a response curve
//! - `correlation`: cross- and autocorrelation

pub mod convolution;
pub mod correlation;
pub mod fft;
pub mod filter;
pub mod smooth;

pub use convolution::*;
pub use correlation::*;
pub use fft::fft;
pub use filter::*;
pub use smooth::*;
