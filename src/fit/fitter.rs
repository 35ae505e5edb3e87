//! Fit driver.
//!
//! One call runs the whole state machine:
//!
//! - Validating: configuration, model capabilities, range, point count,
//!   weights and initial values (any failure here is an error, no iterations)
//! - Iterating: closed-form least squares for linear models, otherwise
//!   Levenberg–Marquardt or simplex
//! - terminal status on the returned `FitResult`, with χ², R², covariance,
//!   fit curve and peak decomposition
//!
//! Nothing is kept between calls.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

use crate::domain::{
    Dataset, FitAlgorithm, FitConfig, FitCurveMode, FitResult, FitStatus, ParameterSetting,
    WeightingPolicy,
};
use crate::error::{AnalysisError, ErrorKind, Result};
use crate::fit::lm::{SolverOutcome, levenberg_marquardt};
use crate::fit::problem::FitProblem;
use crate::fit::simplex::nelder_mead;
use crate::fit::weighting::fit_weights;
use crate::math::{
    covariance_from_jacobian, ensure_finite, ensure_min_points, solve_least_squares, sort_indices,
    weighted_system,
};
use crate::models::{FitModel, ModelRegistry};

const OP: &str = "Fit";

/// Points of the fitted range, sorted by x.
struct Selection {
    x: Vec<f64>,
    y: Vec<f64>,
    errors: Option<Vec<f64>>,
    /// Weighting with arbitrary weights reordered like the points.
    weighting: WeightingPolicy,
    from: f64,
    to: f64,
}

/// Arbitrary weights come one per range point in dataset row order; move them
/// along with the points when the range is sorted by x.
fn sorted_weighting(policy: &WeightingPolicy, order: &[usize]) -> WeightingPolicy {
    match policy {
        WeightingPolicy::ArbitraryDataset { name, values } if values.len() == order.len() => {
            let mut rows = order.to_vec();
            rows.sort_unstable();
            let values = order
                .iter()
                .map(|i| rows.binary_search(i).map_or(f64::NAN, |k| values[k]))
                .collect();
            WeightingPolicy::ArbitraryDataset {
                name: name.clone(),
                values,
            }
        }
        other => other.clone(),
    }
}

fn select_range(data: &Dataset, config: &FitConfig) -> Result<Selection> {
    let (from, to) = config.range.resolve(data, OP)?;
    let (lo, hi) = data.x_range();
    if to < lo || from > hi {
        return Err(AnalysisError::new(OP, ErrorKind::InvalidRange { from, to }));
    }

    let errors = match data.y_errors() {
        Some(e) if e.len() != data.len() => {
            return Err(AnalysisError::new(
                OP,
                ErrorKind::WeightLengthMismatch {
                    dataset: data.name().to_string(),
                    expected: data.len(),
                    actual: e.len(),
                },
            ));
        }
        other => other,
    };

    let order: Vec<usize> = sort_indices(data.x())
        .into_iter()
        .filter(|&i| data.x()[i] >= from && data.x()[i] <= to)
        .collect();
    Ok(Selection {
        x: order.iter().map(|&i| data.x()[i]).collect(),
        y: order.iter().map(|&i| data.y()[i]).collect(),
        errors: errors.map(|e| order.iter().map(|&i| e[i]).collect()),
        weighting: sorted_weighting(&config.weighting, &order),
        from: from.max(lo),
        to: to.min(hi),
    })
}

/// Starting values: explicit settings first, the model's guess for the rest.
fn initial_values(model: &dyn FitModel, settings: &[ParameterSetting], x: &[f64], y: &[f64]) -> Result<Vec<f64>> {
    let names = model.parameter_names();
    let needs_guess = settings.len() < names.len() || settings.iter().any(|s| s.initial.is_none());
    let guess = if needs_guess { model.initial_guess(x, y) } else { None };

    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            settings
                .get(i)
                .and_then(|s| s.initial)
                .or_else(|| guess.as_ref().map(|g| g[i]))
                .ok_or_else(|| {
                    AnalysisError::new(
                        OP,
                        ErrorKind::MissingInitialGuess {
                            parameter: name.clone(),
                        },
                    )
                })
        })
        .collect()
}

/// Closed-form weighted least squares for models linear in all parameters.
fn solve_linear(problem: &FitProblem<'_>) -> SolverOutcome {
    let model = problem.model();
    let cols = model.parameter_count();
    let (a, b) = weighted_system(problem.x(), problem.y(), problem.sqrt_weights(), cols, |x, row| {
        model.linear_basis(x, row);
    });
    match solve_least_squares(&a, &b) {
        Some(beta) => SolverOutcome {
            params: beta.iter().copied().collect(),
            iterations: 0,
            status: FitStatus::Converged,
        },
        None => SolverOutcome {
            params: problem.start().to_vec(),
            iterations: 0,
            status: FitStatus::Failed {
                reason: "singular design matrix".to_string(),
            },
        },
    }
}

fn r_square(model: &dyn FitModel, x: &[f64], y: &[f64], p: &[f64]) -> f64 {
    let mean = y.iter().sum::<f64>() / y.len() as f64;
    let ss_tot: f64 = y.iter().map(|v| (v - mean) * (v - mean)).sum();
    let ss_res: f64 = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let r = yi - model.evaluate(xi, p);
            r * r
        })
        .sum();
    if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    }
}

/// `P×P` covariance with zero rows/columns for held parameters.
fn full_covariance(problem: &FitProblem<'_>, p: &[f64]) -> Vec<Vec<f64>> {
    let free = problem.free();
    let size = p.len();
    let mut out = vec![vec![0.0; size]; size];
    if free.is_empty() {
        return out;
    }
    let mut j = DMatrix::<f64>::zeros(problem.len(), free.len());
    problem.jacobian(p, &mut j);
    if j.iter().any(|v| !v.is_finite()) {
        return out;
    }
    let c = covariance_from_jacobian(&j);
    for (a, &i) in free.iter().enumerate() {
        for (b, &k) in free.iter().enumerate() {
            out[i][k] = c[(a, b)];
        }
    }
    out
}

fn curve_abscissae(mode: FitCurveMode, selection: &Selection) -> Vec<f64> {
    match mode {
        FitCurveMode::AtData => selection.x.clone(),
        FitCurveMode::Function { points } => {
            let step = (selection.to - selection.from) / (points - 1) as f64;
            (0..points).map(|i| selection.from + step * i as f64).collect()
        }
    }
}

/// Build the model named by `config.model` and fit it.
pub fn fit(data: &Dataset, config: &FitConfig, registry: &ModelRegistry) -> Result<FitResult> {
    let model = config.model.build(registry)?;
    fit_model(data, model.as_ref(), config)
}

/// Fit an already built model.
#[tracing::instrument(skip_all, fields(dataset = data.name(), model = model.label()))]
pub fn fit_model(data: &Dataset, model: &dyn FitModel, config: &FitConfig) -> Result<FitResult> {
    debug!(state = "Validating");

    config.validate()?;
    if config.algorithm.needs_gradient() && !model.has_gradient() {
        return Err(AnalysisError::new(
            OP,
            ErrorKind::UnsupportedAlgorithmForModel {
                model: model.label().to_string(),
                algorithm: config.algorithm.label().to_string(),
            },
        ));
    }
    ensure_finite(data, OP)?;

    let selection = select_range(data, config)?;
    ensure_min_points(selection.x.len(), model.min_points().max(1), OP)?;

    let names = model.parameter_names();
    if !config.parameters.is_empty() && config.parameters.len() != names.len() {
        return Err(AnalysisError::new(
            OP,
            ErrorKind::ParameterCountMismatch {
                expected: names.len(),
                actual: config.parameters.len(),
            },
        ));
    }
    let weights = fit_weights(&selection.weighting, data.name(), &selection.y, selection.errors.as_deref())?;
    let start = initial_values(model, &config.parameters, &selection.x, &selection.y)?;
    let held: Vec<bool> = (0..names.len())
        .map(|i| config.parameters.get(i).is_some_and(|s| s.held))
        .collect();

    let mut probe = vec![0.0; names.len()];
    let closed_form = !held.iter().any(|h| *h) && model.linear_basis(selection.x[0], &mut probe);

    let problem = FitProblem::new(
        model,
        selection.x.clone(),
        selection.y.clone(),
        &weights,
        start,
        &held,
    );

    debug!(
        state = "Iterating",
        points = problem.len(),
        free = problem.free().len(),
        closed_form,
        algorithm = config.algorithm.label()
    );
    let outcome = if closed_form {
        solve_linear(&problem)
    } else {
        match config.algorithm {
            FitAlgorithm::ScaledLevenbergMarquardt => {
                levenberg_marquardt(&problem, true, config.tolerance, config.max_iterations)
            }
            FitAlgorithm::UnscaledLevenbergMarquardt => {
                levenberg_marquardt(&problem, false, config.tolerance, config.max_iterations)
            }
            FitAlgorithm::NelderMeadSimplex => {
                nelder_mead(&problem, config.tolerance, config.max_iterations)
            }
        }
    };
    let params = outcome.params;

    let mut residuals = DVector::<f64>::zeros(problem.len());
    problem.residuals(&params, &mut residuals);
    let chi_square = residuals.norm_squared();
    let r2 = r_square(model, &selection.x, &selection.y, &params);

    let mut covariance = full_covariance(&problem, &params);
    let free_count = problem.free().len();
    if config.scale_errors {
        let dof = selection.x.len().saturating_sub(free_count).max(1) as f64;
        let factor = chi_square / dof;
        for row in covariance.iter_mut() {
            for v in row.iter_mut() {
                *v *= factor;
            }
        }
    }
    let errors = (0..names.len())
        .map(|i| covariance[i][i].max(0.0).sqrt())
        .collect();

    let curve_x = curve_abscissae(config.curve, &selection);
    let curve_y = curve_x.iter().map(|&x| model.evaluate(x, &params)).collect();
    let curve = Dataset::new(format!("{} fit of {}", model.label(), data.name()), curve_x.clone(), curve_y)?;

    let (peaks, peak_curves) = match model.peak_model() {
        Some(pm) => {
            let rows = pm.rows(&params);
            let mut curves = Vec::new();
            if pm.is_multi() && config.emit_peak_curves {
                for i in 0..pm.peaks() {
                    let y = pm.peak_curve(i, &curve_x, &params)?;
                    curves.push(Dataset::new(
                        format!("Peak{} fit of {}", i + 1, data.name()),
                        curve_x.clone(),
                        y,
                    )?);
                }
            }
            (rows, curves)
        }
        None => (Vec::new(), Vec::new()),
    };

    debug!(
        state = %outcome.status,
        iterations = outcome.iterations,
        chi_square,
        r_square = r2
    );
    info!(
        dataset = data.name(),
        model = model.label(),
        status = %outcome.status,
        iterations = outcome.iterations,
        "fit finished"
    );

    Ok(FitResult {
        source: data.name().to_string(),
        model_label: model.label().to_string(),
        formula: model.formula(),
        parameter_names: names.to_vec(),
        parameters: params,
        errors,
        covariance,
        held,
        iterations: outcome.iterations,
        status: outcome.status,
        chi_square,
        r_square: r2,
        points: selection.x.len(),
        x_from: selection.from,
        x_to: selection.to,
        algorithm: config.algorithm,
        closed_form,
        weighting: config.weighting.label(),
        tolerance: config.tolerance,
        curve,
        peaks,
        peak_curves,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    use super::*;
    use crate::domain::{WeightingPolicy, XRange};
    use crate::models::{ExponentialVariant, ModelSpec, PeakKind, PluginEval, PluginModel};

    fn sampled(name: &str, from: f64, to: f64, n: usize, f: impl Fn(f64) -> f64) -> Dataset {
        let x: Vec<f64> = (0..n)
            .map(|i| from + (to - from) * i as f64 / (n - 1) as f64)
            .collect();
        let y = x.iter().map(|&v| f(v)).collect();
        Dataset::new(name, x, y).unwrap()
    }

    fn gaussian_data() -> Dataset {
        sampled("Signal1", -5.0, 9.0, 50, |x| {
            5.0 * (-(x - 2.0) * (x - 2.0) / (2.0 * 0.5 * 0.5)).exp() + 0.1
        })
    }

    #[test]
    fn linear_fit_is_closed_form() {
        let data = sampled("Line", 0.0, 10.0, 21, |x| 2.0 * x + 3.0);
        let result = fit(&data, &FitConfig::new(ModelSpec::Linear), &ModelRegistry::new()).unwrap();
        assert_abs_diff_eq!(result.parameters[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(result.parameters[1], 3.0, epsilon = 1e-6);
        assert!(result.r_square > 0.999);
        assert!(result.closed_form);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.status, FitStatus::Converged);
        assert_eq!(result.curve.name(), "Linear fit of Line");
        assert_eq!(result.curve.len(), 100);
    }

    #[test]
    fn gaussian_scenario_converges() {
        let config = FitConfig::new(ModelSpec::Gaussian);
        let result = fit(&gaussian_data(), &config, &ModelRegistry::new()).unwrap();
        assert_eq!(result.status, FitStatus::Converged);
        assert_abs_diff_eq!(result.parameter("xc").unwrap(), 2.0, epsilon = 0.05);
        assert_abs_diff_eq!(result.parameter("w").unwrap(), 0.5, epsilon = 0.05);
        assert!(result.r_square > 0.99);
        assert_eq!(result.curve.name(), "Gauss fit of Signal1");
        assert_eq!(result.peaks.len(), 1);
        assert!(result.peak_curves.is_empty());
    }

    #[test]
    fn two_points_are_not_enough_for_a_gaussian() {
        let data = Dataset::new("Tiny", vec![0.0, 1.0], vec![1.0, 2.0]).unwrap();
        let err = fit(&data, &FitConfig::new(ModelSpec::Gaussian), &ModelRegistry::new()).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::InsufficientData {
                required: 4,
                available: 2
            }
        );
    }

    #[test]
    fn unweighted_fit_is_deterministic() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let noise = Normal::new(0.0, 0.05).unwrap();
        let base = gaussian_data();
        let y: Vec<f64> = base.y().iter().map(|v| v + noise.sample(&mut rng)).collect();
        let data = Dataset::new("Noisy", base.x().to_vec(), y).unwrap();
        let config = FitConfig::new(ModelSpec::Lorentzian);
        let reg = ModelRegistry::new();
        assert_eq!(fit(&data, &config, &reg).unwrap(), fit(&data, &config, &reg).unwrap());
    }

    #[test]
    fn held_parameter_is_kept() {
        let data = sampled("Decay", 0.0, 8.0, 80, |x| 4.0 * (-x / 1.5).exp() + 0.5);
        let config = FitConfig::new(ModelSpec::Exponential(ExponentialVariant::Decay1)).with_parameters(vec![
            ParameterSetting::auto(),
            ParameterSetting::auto(),
            ParameterSetting::held(0.5),
        ]);
        let result = fit(&data, &config, &ModelRegistry::new()).unwrap();
        assert_eq!(result.parameters[2], 0.5);
        assert_eq!(result.errors[2], 0.0);
        assert_eq!(result.covariance[2], vec![0.0; 3]);
        assert_abs_diff_eq!(result.parameters[1], 1.5, epsilon = 1e-3);
        assert_eq!(result.free_parameter_count(), 2);
    }

    #[test]
    fn held_linear_parameter_falls_back_to_iteration() {
        let data = sampled("Line", 0.0, 10.0, 11, |x| 2.0 * x + 3.0);
        let config = FitConfig::new(ModelSpec::Linear)
            .with_parameters(vec![ParameterSetting::auto(), ParameterSetting::held(3.0)]);
        let result = fit(&data, &config, &ModelRegistry::new()).unwrap();
        assert!(!result.closed_form);
        assert_abs_diff_eq!(result.parameters[0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn range_selects_and_sorts_points() {
        let data = Dataset::new(
            "Shuffled",
            vec![5.0, 1.0, 3.0, 2.0, 4.0, 0.0],
            vec![10.0, 2.0, 6.0, 4.0, 8.0, 0.0],
        )
        .unwrap();
        let config = FitConfig::new(ModelSpec::Linear).with_range(XRange::explicit(1.0, 4.0));
        let result = fit(&data, &config, &ModelRegistry::new()).unwrap();
        assert_eq!(result.points, 4);
        assert_eq!((result.x_from, result.x_to), (1.0, 4.0));

        let outside = FitConfig::new(ModelSpec::Linear).with_range(XRange::explicit(10.0, 20.0));
        let err = fit(&data, &outside, &ModelRegistry::new()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidRange { .. }));
    }

    #[test]
    fn instrumental_weighting_needs_errors() {
        let data = sampled("NoErrors", 0.0, 1.0, 5, |x| x);
        let config = FitConfig::new(ModelSpec::Linear).with_weighting(WeightingPolicy::Instrumental);
        let err = fit(&data, &config, &ModelRegistry::new()).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::MissingWeightColumn {
                dataset: "NoErrors".into()
            }
        );

        let data = data.with_y_errors(vec![0.1; 5]).unwrap();
        let result = fit(&data, &config, &ModelRegistry::new()).unwrap();
        assert_eq!(result.weighting, "Instrumental");
        assert!(result.errors[0] > 0.0);
    }

    #[test]
    fn arbitrary_weights_follow_their_rows_when_sorted() {
        // Row 2 is an outlier with a large sigma; it must keep that sigma after sorting.
        let data = Dataset::new(
            "Shuffled",
            vec![3.0, 0.0, 4.0, 1.0, 2.0],
            vec![7.0, 1.0, 14.0, 3.0, 5.0],
        )
        .unwrap();
        let config = FitConfig::new(ModelSpec::Linear).with_weighting(WeightingPolicy::ArbitraryDataset {
            name: "Sigma".into(),
            values: vec![1.0, 1.0, 1000.0, 1.0, 1.0],
        });
        let result = fit(&data, &config, &ModelRegistry::new()).unwrap();
        assert_abs_diff_eq!(result.parameter("A").unwrap(), 2.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.parameter("B").unwrap(), 1.0, epsilon = 1e-3);

        let sorted = Dataset::new(
            "Sorted",
            vec![0.0, 1.0, 2.0, 3.0, 4.0],
            vec![1.0, 3.0, 5.0, 7.0, 14.0],
        )
        .unwrap();
        let config = FitConfig::new(ModelSpec::Linear).with_weighting(WeightingPolicy::ArbitraryDataset {
            name: "Sigma".into(),
            values: vec![1.0, 1.0, 1.0, 1.0, 1000.0],
        });
        let reference = fit(&sorted, &config, &ModelRegistry::new()).unwrap();
        for (a, b) in result.parameters.iter().zip(&reference.parameters) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn multi_peak_emits_rows_and_curves() {
        let data = sampled("Spectrum", 0.0, 10.0, 201, |x| {
            3.0 * (-(x - 3.0) * (x - 3.0) / 0.5).exp() + 2.0 * (-(x - 7.0) * (x - 7.0) / 0.5).exp() + 0.2
        });
        let config = FitConfig::new(ModelSpec::MultiPeak {
            kind: PeakKind::Gaussian,
            peaks: 2,
            seeds: vec![],
        });
        let result = fit(&data, &config, &ModelRegistry::new()).unwrap();
        assert_eq!(result.status, FitStatus::Converged);
        assert_eq!(result.peaks.len(), 2);
        assert_eq!(result.peak_curves.len(), 2);
        assert_eq!(result.peak_curves[1].name(), "Peak2 fit of Spectrum");
        let mut heights: Vec<f64> = result.peaks.iter().map(|p| p.height).collect();
        heights.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_abs_diff_eq!(heights[0], 2.0, epsilon = 1e-3);
        assert_abs_diff_eq!(heights[1], 3.0, epsilon = 1e-3);
    }

    #[test]
    fn plugin_without_gradient_needs_simplex() {
        let mut reg = ModelRegistry::new();
        let eval: PluginEval = Arc::new(|x, p| p[0] * (p[1] * x).sin());
        reg.register_plugin(PluginModel::new("wave", vec!["a".into(), "k".into()], "a*sin(k*x)", eval));
        let data = sampled("Wave", 0.0, 6.0, 60, |x| 2.0 * (1.1 * x).sin());
        let spec = ModelSpec::Plugin { name: "wave".into() };

        let err = fit(&data, &FitConfig::new(spec.clone()), &reg).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnsupportedAlgorithmForModel { .. }));

        let config = FitConfig::new(spec).with_algorithm(FitAlgorithm::NelderMeadSimplex);
        let err = fit(&data, &config, &reg).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::MissingInitialGuess {
                parameter: "a".into()
            }
        );

        let mut config = config.with_parameters(vec![ParameterSetting::free(1.8), ParameterSetting::free(1.0)]);
        config.tolerance = 1e-6;
        let result = fit(&data, &config, &reg).unwrap();
        assert_abs_diff_eq!(result.parameters[0], 2.0, epsilon = 1e-2);
        assert_abs_diff_eq!(result.parameters[1], 1.1, epsilon = 1e-2);
    }

    #[test]
    fn user_expression_fits_with_numeric_jacobian() {
        let data = sampled("Quad", -2.0, 2.0, 41, |x| 1.5 * x * x - 0.5);
        let config = FitConfig::new(ModelSpec::UserExpression {
            expression: "a*x^2 + b".into(),
            parameters: vec!["a".into(), "b".into()],
        })
        .with_parameters(vec![ParameterSetting::free(1.0), ParameterSetting::free(0.0)]);
        let result = fit(&data, &config, &ModelRegistry::new()).unwrap();
        assert_eq!(result.status, FitStatus::Converged);
        assert_abs_diff_eq!(result.parameters[0], 1.5, epsilon = 1e-5);
        assert_abs_diff_eq!(result.parameters[1], -0.5, epsilon = 1e-5);
    }

    #[test]
    fn parameter_settings_must_cover_every_parameter() {
        let data = sampled("Line", 0.0, 1.0, 5, |x| x);
        let config = FitConfig::new(ModelSpec::Linear).with_parameters(vec![ParameterSetting::auto()]);
        let err = fit(&data, &config, &ModelRegistry::new()).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::ParameterCountMismatch {
                expected: 2,
                actual: 1
            }
        );
    }
}
