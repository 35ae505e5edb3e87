//! The fit-model capability interface and the serializable model selector.
//!
//! The solver only ever talks to a `dyn FitModel`:
//! - evaluate `y(x)` for a parameter vector (residuals, fit curves)
//! - parameter derivatives (Levenberg–Marquardt Jacobian, covariance)
//! - optional closed-form basis (linear models) and initial guesses
//!
//! Built-in, user-expression and plugin models all implement it; which one is
//! used is decided once, when a [`ModelSpec`] is built against a
//! [`ModelRegistry`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, ErrorKind, Result};
use crate::models::builtin::{BoltzmannModel, ExponentialModel, LinearModel, PolynomialModel};
use crate::models::expression::ExpressionModel;
use crate::models::peak::{PeakModel, PeakShape};
use crate::models::registry::ModelRegistry;

/// A model `y = f(x; p)` the fit engine can estimate.
pub trait FitModel: fmt::Debug + Send + Sync {
    /// Short label used in result names ("Gauss", "Lorentz", ...).
    fn label(&self) -> &str;

    /// Parameter names; their order is the order of every parameter vector.
    fn parameter_names(&self) -> &[String];

    /// Human-readable formula using the parameter names.
    fn formula(&self) -> String;

    fn evaluate(&self, x: f64, params: &[f64]) -> f64;

    /// Whether a gradient entry point exists (required by Levenberg–Marquardt).
    fn has_gradient(&self) -> bool {
        true
    }

    /// Fill `out[j] = ∂f/∂p_j` at `x`.
    fn gradient(&self, x: f64, params: &[f64], out: &mut [f64]) {
        numeric_gradient(self, x, params, out);
    }

    /// For models linear in their parameters: fill the design row at `x` and
    /// return `true`.
    fn linear_basis(&self, _x: f64, _out: &mut [f64]) -> bool {
        false
    }

    /// Data-driven starting values; `None` means the caller must supply them.
    fn initial_guess(&self, _x: &[f64], _y: &[f64]) -> Option<Vec<f64>> {
        None
    }

    /// Minimum number of points in the fitted range.
    fn min_points(&self) -> usize {
        self.parameter_names().len()
    }

    /// Peak decomposition support (per-peak table and curves).
    fn peak_model(&self) -> Option<&PeakModel> {
        None
    }

    fn parameter_count(&self) -> usize {
        self.parameter_names().len()
    }
}

/// Central-difference parameter derivatives.
pub fn numeric_gradient<M: FitModel + ?Sized>(model: &M, x: f64, params: &[f64], out: &mut [f64]) {
    let mut p = params.to_vec();
    for j in 0..params.len() {
        let h = f64::EPSILON.cbrt() * params[j].abs().max(1.0);
        p[j] = params[j] + h;
        let up = model.evaluate(x, &p);
        p[j] = params[j] - h;
        let down = model.evaluate(x, &p);
        p[j] = params[j];
        out[j] = (up - down) / (2.0 * h);
    }
}

/// Exponential model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExponentialVariant {
    /// `A·exp(x/t) + y0`
    Growth,
    /// `A·exp(-x/t) + y0`
    Decay1,
    /// Two decaying terms plus offset.
    Decay2,
    /// Three decaying terms plus offset.
    Decay3,
}

impl ExponentialVariant {
    pub fn terms(self) -> usize {
        match self {
            ExponentialVariant::Growth | ExponentialVariant::Decay1 => 1,
            ExponentialVariant::Decay2 => 2,
            ExponentialVariant::Decay3 => 3,
        }
    }
}

/// Peak kernels available to multi-peak fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakKind {
    Gaussian,
    Lorentzian,
}

/// A programmatic stand-in for the host's "click on each peak" interaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakSeed {
    pub center: f64,
    pub height: f64,
}

/// Which model to fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSpec {
    Linear,
    Polynomial {
        order: usize,
    },
    Exponential(ExponentialVariant),
    Sigmoidal,
    Gaussian,
    Lorentzian,
    GaussAmp,
    MultiPeak {
        kind: PeakKind,
        peaks: usize,
        #[serde(default)]
        seeds: Vec<PeakSeed>,
    },
    /// An ad-hoc expression in `x` and the listed parameters.
    UserExpression {
        expression: String,
        parameters: Vec<String>,
    },
    /// A user function previously registered by name.
    UserFunction {
        name: String,
    },
    /// A plugin model previously registered by name.
    Plugin {
        name: String,
    },
}

impl ModelSpec {
    /// Resolve this selector to a concrete model.
    pub fn build(&self, registry: &ModelRegistry) -> Result<Box<dyn FitModel>> {
        let model: Box<dyn FitModel> = match self {
            ModelSpec::Linear => Box::new(LinearModel::new()),
            ModelSpec::Polynomial { order } => Box::new(PolynomialModel::new(*order)),
            ModelSpec::Exponential(variant) => Box::new(ExponentialModel::new(*variant)),
            ModelSpec::Sigmoidal => Box::new(BoltzmannModel::new()),
            ModelSpec::Gaussian => Box::new(PeakModel::single(PeakShape::Gaussian)),
            ModelSpec::Lorentzian => Box::new(PeakModel::single(PeakShape::Lorentzian)),
            ModelSpec::GaussAmp => Box::new(PeakModel::single(PeakShape::GaussAmp)),
            ModelSpec::MultiPeak { kind, peaks, seeds } => {
                if *peaks == 0 {
                    return Err(AnalysisError::new(
                        "Fit",
                        ErrorKind::PointCountError { points: 0 },
                    ));
                }
                Box::new(PeakModel::multi(*kind, *peaks, seeds.clone()))
            }
            ModelSpec::UserExpression {
                expression,
                parameters,
            } => Box::new(ExpressionModel::compile(
                "NonLinear",
                expression,
                parameters,
                registry,
            )?),
            ModelSpec::UserFunction { name } => Box::new(registry.user_model(name)?),
            ModelSpec::Plugin { name } => Box::new(registry.plugin(name)?.clone()),
        };
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Square {
        names: Vec<String>,
    }

    impl FitModel for Square {
        fn label(&self) -> &str {
            "Square"
        }
        fn parameter_names(&self) -> &[String] {
            &self.names
        }
        fn formula(&self) -> String {
            "a*x^2".into()
        }
        fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
            params[0] * x * x
        }
    }

    #[test]
    fn numeric_gradient_matches_analytic() {
        let m = Square {
            names: vec!["a".into()],
        };
        let mut g = [0.0];
        m.gradient(3.0, &[2.0], &mut g);
        assert!((g[0] - 9.0).abs() < 1e-6);
    }

    #[test]
    fn spec_builds_expected_parameter_orders() {
        let reg = ModelRegistry::new();
        let gauss = ModelSpec::Gaussian.build(&reg).unwrap();
        assert_eq!(gauss.parameter_names(), ["A", "xc", "w", "y0"]);
        let multi = ModelSpec::MultiPeak {
            kind: PeakKind::Lorentzian,
            peaks: 2,
            seeds: vec![],
        }
        .build(&reg)
        .unwrap();
        assert_eq!(
            multi.parameter_names(),
            ["A1", "xc1", "w1", "A2", "xc2", "w2", "y0"]
        );
        assert_eq!(multi.min_points(), 7);
    }

    #[test]
    fn zero_peaks_is_rejected() {
        let reg = ModelRegistry::new();
        let err = ModelSpec::MultiPeak {
            kind: PeakKind::Gaussian,
            peaks: 0,
            seeds: vec![],
        }
        .build(&reg)
        .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::PointCountError { points: 0 });
    }

    #[test]
    fn spec_deserializes_from_host_json() {
        let spec: ModelSpec =
            serde_json::from_str(r#"{"exponential":"decay2"}"#).unwrap();
        assert_eq!(spec, ModelSpec::Exponential(ExponentialVariant::Decay2));
        let spec: ModelSpec = serde_json::from_str(r#"{"polynomial":{"order":3}}"#).unwrap();
        assert_eq!(spec, ModelSpec::Polynomial { order: 3 });
    }
}
