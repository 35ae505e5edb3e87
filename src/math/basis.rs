//! Numerically stable building blocks for the built-in model families.
//!
//! - `logistic(z) = 1 / (1 + exp(z))`, the Boltzmann sigmoid kernel
//! - Gaussian and Lorentzian peak profiles and their parameter derivatives
//!
//! Numerical notes:
//! - `1 / (1 + exp(z))` overflows `exp` for large `z`; we branch on the sign of
//!   `z` so the exponential argument is never positive.
//! - Peak derivatives are written in terms of the profile value so that far
//!   tails underflow to exactly zero instead of producing `0 * inf`.

use std::f64::consts::PI;

/// `sqrt(2π)`.
const SQRT_2PI: f64 = 2.506_628_274_631_000_7;

/// Compute `1 / (1 + exp(z))` without overflow.
pub fn logistic(z: f64) -> f64 {
    if z > 0.0 {
        let e = (-z).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + z.exp())
    }
}

/// Gaussian with unit area: `exp(-(x-xc)²/(2w²)) / (w·sqrt(2π))`.
pub fn gaussian_unit_area(x: f64, xc: f64, w: f64) -> f64 {
    let d = (x - xc) / w;
    (-0.5 * d * d).exp() / (w * SQRT_2PI)
}

/// Gaussian with unit height: `exp(-(x-xc)²/(2w²))`.
pub fn gaussian_unit_height(x: f64, xc: f64, w: f64) -> f64 {
    let d = (x - xc) / w;
    (-0.5 * d * d).exp()
}

/// Lorentzian with unit area and full width `w`: `(2/π)·w / (4(x-xc)² + w²)`.
pub fn lorentzian_unit_area(x: f64, xc: f64, w: f64) -> f64 {
    let d = x - xc;
    2.0 / PI * w / (4.0 * d * d + w * w)
}

/// Height of an area-normalised Gaussian of area `a` and width `w`.
pub fn gaussian_height(a: f64, w: f64) -> f64 {
    a / (w * SQRT_2PI)
}

/// Area of a Gaussian of height `h` and width `w`.
pub fn gaussian_area(h: f64, w: f64) -> f64 {
    h * w * SQRT_2PI
}

/// Height of an area-normalised Lorentzian of area `a` and full width `w`.
pub fn lorentzian_height(a: f64, w: f64) -> f64 {
    2.0 * a / (PI * w)
}

/// Area of a Lorentzian of height `h` and full width `w`.
pub fn lorentzian_area(h: f64, w: f64) -> f64 {
    h * PI * w / 2.0
}

/// FWHM of a Gaussian is `2·sqrt(2 ln 2)·σ`.
pub const GAUSSIAN_FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949_3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logistic_limits() {
        assert!((logistic(0.0) - 0.5).abs() < 1e-15);
        assert!(logistic(1000.0).abs() < 1e-300);
        assert!((logistic(-1000.0) - 1.0).abs() < 1e-15);
        assert!(logistic(1000.0).is_finite());
    }

    #[test]
    fn gaussian_area_height_roundtrip() {
        let h = gaussian_height(6.0, 0.5);
        assert!((gaussian_area(h, 0.5) - 6.0).abs() < 1e-12);
        assert!((gaussian_unit_area(2.0, 2.0, 0.5) * 6.0 - h).abs() < 1e-12);
    }

    #[test]
    fn lorentzian_peak_value_matches_height() {
        let a = 3.0;
        let w = 0.8;
        assert!((a * lorentzian_unit_area(1.0, 1.0, w) - lorentzian_height(a, w)).abs() < 1e-12);
        assert!((lorentzian_area(lorentzian_height(a, w), w) - a).abs() < 1e-12);
    }

    #[test]
    fn unit_area_profiles_integrate_to_one() {
        let n = 20_000;
        let (lo, hi) = (-50.0, 50.0);
        let h = (hi - lo) / n as f64;
        let mut g = 0.0;
        for i in 0..n {
            let x = lo + (i as f64 + 0.5) * h;
            g += gaussian_unit_area(x, 0.0, 1.3) * h;
        }
        assert!((g - 1.0).abs() < 1e-6, "gaussian area {g}");
    }
}
