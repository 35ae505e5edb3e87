//! Fit outputs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{Dataset, FitAlgorithm};

/// Terminal state of one fit invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    Converged,
    /// Soft failure: the parameters are the best found before the cap.
    MaxIterationsReached,
    /// Numerical breakdown mid-iteration; the parameters are the last good ones.
    Failed { reason: String },
}

impl FitStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, FitStatus::Converged)
    }
}

impl fmt::Display for FitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitStatus::Converged => f.write_str("success"),
            FitStatus::MaxIterationsReached => f.write_str("exceeded max number of iterations"),
            FitStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// One decomposed peak of a peak fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakRow {
    pub area: f64,
    pub center: f64,
    pub width: f64,
    pub height: f64,
}

/// Everything one fit produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Name of the fitted dataset.
    pub source: String,
    pub model_label: String,
    pub formula: String,
    pub parameter_names: Vec<String>,
    pub parameters: Vec<f64>,
    /// Standard errors (zero for held parameters).
    pub errors: Vec<f64>,
    /// `P×P` covariance, rows and columns of held parameters are zero.
    pub covariance: Vec<Vec<f64>>,
    pub held: Vec<bool>,
    pub iterations: usize,
    pub status: FitStatus,
    /// Weighted sum of squared residuals.
    pub chi_square: f64,
    pub r_square: f64,
    /// Points inside the fitted range.
    pub points: usize,
    pub x_from: f64,
    pub x_to: f64,
    pub algorithm: FitAlgorithm,
    /// Solved in closed form (the algorithm was not iterated).
    pub closed_form: bool,
    pub weighting: String,
    pub tolerance: f64,
    pub curve: Dataset,
    pub peaks: Vec<PeakRow>,
    pub peak_curves: Vec<Dataset>,
}

impl FitResult {
    pub fn free_parameter_count(&self) -> usize {
        self.held.iter().filter(|h| !**h).count()
    }

    /// Degrees of freedom: points minus free parameters (at least 1).
    pub fn dof(&self) -> usize {
        self.points.saturating_sub(self.free_parameter_count()).max(1)
    }

    pub fn chi_square_per_dof(&self) -> f64 {
        self.chi_square / self.dof() as f64
    }

    /// Value of a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameter_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.parameters[i])
    }

    /// Standard error of a parameter by name.
    pub fn error(&self, name: &str) -> Option<f64> {
        self.parameter_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.errors[i])
    }
}
