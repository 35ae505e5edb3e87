//! Definite integrals of sampled curves.
//!
//! The curve is turned into an [`Interpolant`] and `[from, to]` is split at
//! the knots inside it, so every piece is a single polynomial. Each piece is
//! integrated with the trapezoidal rule on successively halved steps. For
//! `order > 1` the last `order` estimates are extrapolated to zero step size
//! (Neville's scheme on `h²`), which is Romberg integration; order 1 is the
//! plain trapezoidal rule. A piece is done when its estimated error drops
//! below `tolerance` relative to its magnitude, or after `max_iterations`
//! halvings.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::interpolation::Interpolant;
use crate::domain::{Dataset, FitResult, IntegrationConfig, InterpolationMethod};
use crate::error::{AnalysisError, ErrorKind, Result};

const OP: &str = "Integration";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationResult {
    pub dataset: String,
    pub from: f64,
    pub to: f64,
    pub area: f64,
    /// Position and value of the curve's maximum inside `[from, to]`.
    pub peak_x: f64,
    pub peak_y: f64,
    /// Most halvings any knot interval needed.
    pub iterations: usize,
    pub converged: bool,
    pub order: usize,
    pub method: InterpolationMethod,
}

/// Trapezoidal estimates on `1, 2, 4, …` intervals, one per call.
struct Trapezoid<'a> {
    f: &'a Interpolant,
    a: f64,
    b: f64,
    level: usize,
    value: f64,
    /// Largest `|f|` sampled so far.
    peak: f64,
}

impl<'a> Trapezoid<'a> {
    fn new(f: &'a Interpolant, a: f64, b: f64) -> Self {
        Self {
            f,
            a,
            b,
            level: 0,
            value: 0.0,
            peak: 0.0,
        }
    }

    fn sample(&mut self, t: f64) -> f64 {
        let v = self.f.eval(t);
        self.peak = self.peak.max(v.abs());
        v
    }

    fn refine(&mut self) -> f64 {
        let span = self.b - self.a;
        if self.level == 0 {
            let ends = self.sample(self.a) + self.sample(self.b);
            self.value = 0.5 * span * ends;
        } else {
            let new_points = 1usize << (self.level - 1);
            let step = span / new_points as f64;
            let sum: f64 = (0..new_points)
                .map(|k| self.sample(self.a + (k as f64 + 0.5) * step))
                .sum();
            self.value = 0.5 * (self.value + step * sum);
        }
        self.level += 1;
        self.value
    }

    /// Scale the error of this piece is judged against.
    fn magnitude(&self) -> f64 {
        (self.b - self.a) * self.peak
    }
}

/// Extrapolate `(h², s)` pairs to `h = 0`; returns the value and the size of
/// the last correction.
fn neville(h: &[f64], s: &[f64]) -> (f64, f64) {
    let k = s.len();
    let mut c = s.to_vec();
    let mut d = s.to_vec();
    let mut y = s[k - 1];
    let mut dy = 0.0;
    // Tableau walked from the newest point backwards.
    for m in 1..k {
        for i in 0..k - m {
            let ho = h[i];
            let hp = h[i + m];
            let w = c[i + 1] - d[i];
            let den = ho - hp;
            let ratio = w / den;
            d[i] = hp * ratio;
            c[i] = ho * ratio;
        }
        dy = d[k - m - 1];
        y += dy;
    }
    (y, dy)
}

/// Outcome of one knot interval.
struct Piece {
    area: f64,
    iterations: usize,
    converged: bool,
}

fn integrate_piece(f: &Interpolant, a: f64, b: f64, config: &IntegrationConfig) -> Piece {
    let mut trapezoid = Trapezoid::new(f, a, b);
    let mut steps = Vec::with_capacity(config.max_iterations);
    let mut estimates = Vec::with_capacity(config.max_iterations);
    let mut piece = Piece {
        area: 0.0,
        iterations: 0,
        converged: false,
    };

    for j in 0..config.max_iterations {
        estimates.push(trapezoid.refine());
        steps.push(0.25f64.powi(j as i32));
        piece.iterations = j + 1;

        let n = estimates.len();
        let (value, error) = if config.order == 1 {
            let previous = if n > 1 { estimates[n - 2] } else { f64::NAN };
            (estimates[n - 1], estimates[n - 1] - previous)
        } else if n >= config.order {
            let start = n - config.order;
            neville(&steps[start..], &estimates[start..])
        } else {
            (estimates[n - 1], f64::NAN)
        };
        piece.area = value;
        // At least two estimates always precede acceptance; NaN never passes.
        if error.abs() <= config.tolerance * value.abs().max(trapezoid.magnitude()) {
            piece.converged = true;
            break;
        }
    }
    piece
}

/// Integrate a curve over `config.range`.
///
/// The resolved range must lie inside the curve's x range.
#[tracing::instrument(skip_all, fields(dataset = data.name(), order = config.order))]
pub fn integrate(data: &Dataset, config: &IntegrationConfig) -> Result<IntegrationResult> {
    config.validate()?;
    let f = Interpolant::from_dataset(data, config.method, OP)?;
    let (from, to) = config.range.resolve(data, OP)?;
    let (lo, hi) = f.x_range();
    if from < lo || to > hi {
        return Err(AnalysisError::new(OP, ErrorKind::InvalidRange { from, to }));
    }

    let mut bounds = Vec::with_capacity(f.x().len() + 2);
    bounds.push(from);
    bounds.extend(f.x().iter().copied().filter(|&x| x > from && x < to));
    bounds.push(to);

    let mut area = 0.0;
    let mut iterations = 0;
    let mut converged = true;
    for w in bounds.windows(2) {
        let piece = integrate_piece(&f, w[0], w[1], config);
        area += piece.area;
        iterations = iterations.max(piece.iterations);
        converged &= piece.converged;
    }

    if converged {
        debug!(area, iterations, pieces = bounds.len() - 1, "integral converged");
    } else {
        warn!(area, iterations, "integral did not reach the requested tolerance");
    }

    let (peak_x, peak_y) = peak_in_range(&f, from, to);
    Ok(IntegrationResult {
        dataset: data.name().to_string(),
        from,
        to,
        area,
        peak_x,
        peak_y,
        iterations,
        converged,
        order: config.order,
        method: config.method,
    })
}

/// Largest sample inside `[from, to]`, or the larger end value when no sample
/// falls inside.
fn peak_in_range(f: &Interpolant, from: f64, to: f64) -> (f64, f64) {
    let ends = [(from, f.eval(from)), (to, f.eval(to))];
    f.x()
        .iter()
        .zip(f.y())
        .filter(|(x, _)| **x >= from && **x <= to)
        .map(|(&x, &y)| (x, y))
        .chain(ends)
        .fold((from, f64::NEG_INFINITY), |best, p| if p.1 > best.1 { p } else { best })
}

/// Area of every peak of a peak fit, with the fitted baseline removed.
///
/// Multi-peak fits integrate each emitted peak curve; single-peak fits
/// integrate the fit curve.
#[tracing::instrument(skip_all, fields(fit = %result.curve.name()))]
pub fn integrate_peaks(result: &FitResult, config: &IntegrationConfig) -> Result<Vec<IntegrationResult>> {
    let baseline = result.parameter("y0").unwrap_or(0.0);
    let curves: Vec<&Dataset> = if result.peak_curves.is_empty() && !result.peaks.is_empty() {
        vec![&result.curve]
    } else {
        result.peak_curves.iter().collect()
    };
    curves
        .into_iter()
        .map(|curve| {
            let above = Dataset::new(
                curve.name(),
                curve.x().to_vec(),
                curve.y().iter().map(|y| y - baseline).collect(),
            )?;
            integrate(&above, config)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    use super::*;
    use crate::domain::{FitConfig, FitCurveMode, RangeBound, XRange};
    use crate::fit::fit;
    use crate::models::{ModelRegistry, ModelSpec, PeakKind};

    #[test]
    fn constant_integrates_exactly_with_trapezoid() {
        let x = vec![0.0, 0.7, 3.0, 4.2, 8.9, 10.0];
        let data = Dataset::new("Ones", x, vec![1.0; 6]).unwrap();
        let out = integrate(&data, &IntegrationConfig::default()).unwrap();
        assert_relative_eq!(out.area, 10.0, epsilon = 1e-12);
        assert!(out.converged);
        assert_eq!((out.from, out.to), (0.0, 10.0));
    }

    #[test]
    fn zig_zag_is_not_accepted_from_coarse_agreement() {
        let x = vec![0.0, 0.5, 1.0, 1.5, 2.0];
        for (y, expected) in [(vec![1.0, 2.0, 1.0, 2.0, 1.0], 3.0), (vec![0.0, 1.0, 0.0, 1.0, 0.0], 1.0)] {
            let data = Dataset::new("ZigZag", x.clone(), y).unwrap();
            for order in 1..=5 {
                let config = IntegrationConfig {
                    order,
                    ..IntegrationConfig::default()
                };
                let out = integrate(&data, &config).unwrap();
                assert!(out.converged, "order {order}");
                assert_abs_diff_eq!(out.area, expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn partial_intervals_at_the_range_ends() {
        let data = Dataset::new("Tent", vec![0.0, 1.0, 2.0], vec![0.0, 2.0, 0.0]).unwrap();
        let config = IntegrationConfig {
            range: XRange::explicit(0.5, 1.5),
            ..IntegrationConfig::default()
        };
        let out = integrate(&data, &config).unwrap();
        assert_abs_diff_eq!(out.area, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn higher_orders_integrate_a_smooth_curve() {
        let x: Vec<f64> = (0..=40).map(|i| i as f64 * std::f64::consts::PI / 40.0).collect();
        let y = x.iter().map(|v| v.sin()).collect();
        let data = Dataset::new("Sine", x, y).unwrap();
        for order in 2..=5 {
            let config = IntegrationConfig {
                order,
                method: InterpolationMethod::Cubic,
                ..IntegrationConfig::default()
            };
            let out = integrate(&data, &config).unwrap();
            assert!(out.converged, "order {order}");
            assert_relative_eq!(out.area, 2.0, epsilon = 1e-3);
            assert_abs_diff_eq!(out.peak_x, std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
            assert_abs_diff_eq!(out.peak_y, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn linear_integrand_matches_the_trapezoid_sum() {
        let data = Dataset::new("Tri", vec![0.0, 1.0, 2.0, 4.0], vec![0.0, 2.0, 0.0, 1.0]).unwrap();
        let out = integrate(&data, &IntegrationConfig::default()).unwrap();
        assert_relative_eq!(out.area, 1.0 + 1.0 + 1.0, epsilon = 1e-5);
        assert_eq!((out.peak_x, out.peak_y), (1.0, 2.0));
    }

    #[test]
    fn symbolic_bounds_resolve_before_range_check() {
        let data = Dataset::new("Ramp", vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 2.0]).unwrap();
        let config = IntegrationConfig {
            range: XRange {
                from: "min".parse::<RangeBound>().unwrap(),
                to: RangeBound::Explicit(1.0),
            },
            ..IntegrationConfig::default()
        };
        let out = integrate(&data, &config).unwrap();
        assert_relative_eq!(out.area, 0.5, epsilon = 1e-6);

        let outside = IntegrationConfig {
            range: XRange::explicit(0.5, 3.0),
            ..IntegrationConfig::default()
        };
        let err = integrate(&data, &outside).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidRange { from: 0.5, to: 3.0 });
    }

    #[test]
    fn invalid_order_is_rejected() {
        let data = Dataset::new("Ramp", vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();
        let config = IntegrationConfig {
            order: 6,
            ..IntegrationConfig::default()
        };
        let err = integrate(&data, &config).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOrder { order: 6, max: 5 });
    }

    #[test]
    fn peak_areas_match_fitted_areas() {
        let x: Vec<f64> = (0..=200).map(|i| i as f64 * 0.05).collect();
        let y = x
            .iter()
            .map(|v| {
                3.0 * (-(v - 3.0) * (v - 3.0) / 0.5).exp() + 2.0 * (-(v - 7.0) * (v - 7.0) / 0.5).exp() + 0.2
            })
            .collect();
        let data = Dataset::new("Spectrum", x, y).unwrap();
        let mut config = FitConfig::new(ModelSpec::MultiPeak {
            kind: PeakKind::Gaussian,
            peaks: 2,
            seeds: vec![],
        });
        config.curve = FitCurveMode::Function { points: 1000 };
        let result = fit(&data, &config, &ModelRegistry::new()).unwrap();

        let config = IntegrationConfig {
            order: 3,
            method: InterpolationMethod::Cubic,
            ..IntegrationConfig::default()
        };
        let areas = integrate_peaks(&result, &config).unwrap();
        assert_eq!(areas.len(), 2);
        for (area, row) in areas.iter().zip(&result.peaks) {
            assert_relative_eq!(area.area, row.area, epsilon = 1e-3);
        }
    }
}
