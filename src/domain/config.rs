//! Operation configuration.
//!
//! Every operation takes one of these plain structs. They all:
//! - deserialize with `#[serde(default)]`, so a host can send partial JSON
//! - default to the values the plotting application ships with
//! - expose `validate()`, run before any numeric work starts

use serde::{Deserialize, Serialize};

use crate::domain::XRange;
use crate::error::{AnalysisError, ErrorKind, Result};
use crate::models::ModelSpec;

/// Iteration cap of the Levenberg–Marquardt solvers.
pub const LM_MAX_ITERATIONS: usize = 1000;
/// Iteration cap of the simplex solver.
pub const SIMPLEX_MAX_ITERATIONS: usize = 1000;
/// Iteration cap of the integration refinement loop.
pub const INTEGRATION_MAX_ITERATIONS: usize = 40;
/// Highest supported integration order.
pub const INTEGRATION_MAX_ORDER: usize = 5;

fn check_tolerance(tolerance: f64, operation: &str) -> Result<()> {
    if tolerance > 0.0 && tolerance < 1.0 {
        Ok(())
    } else {
        Err(AnalysisError::new(
            operation,
            ErrorKind::ToleranceOutOfRange { tolerance },
        ))
    }
}

fn check_iterations(requested: usize, cap: usize, operation: &str) -> Result<()> {
    if (1..=cap).contains(&requested) {
        Ok(())
    } else {
        Err(AnalysisError::new(
            operation,
            ErrorKind::InvalidIterationLimit { requested, cap },
        ))
    }
}

fn check_sampling_interval(value: Option<f64>, operation: &str) -> Result<()> {
    match value {
        Some(v) if !(v.is_finite() && v > 0.0) => Err(AnalysisError::new(
            operation,
            ErrorKind::InvalidSamplingInterval { value: v },
        )),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Fit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FitAlgorithm {
    /// Levenberg–Marquardt with damping scaled by the diagonal of `JᵀJ`.
    #[default]
    ScaledLevenbergMarquardt,
    UnscaledLevenbergMarquardt,
    /// Derivative-free Nelder–Mead.
    NelderMeadSimplex,
}

impl FitAlgorithm {
    pub fn label(self) -> &'static str {
        match self {
            FitAlgorithm::ScaledLevenbergMarquardt => "Scaled Levenberg-Marquardt",
            FitAlgorithm::UnscaledLevenbergMarquardt => "Unscaled Levenberg-Marquardt",
            FitAlgorithm::NelderMeadSimplex => "Nelder-Mead Simplex",
        }
    }

    pub fn needs_gradient(self) -> bool {
        !matches!(self, FitAlgorithm::NelderMeadSimplex)
    }

    pub fn iteration_cap(self) -> usize {
        match self {
            FitAlgorithm::NelderMeadSimplex => SIMPLEX_MAX_ITERATIONS,
            _ => LM_MAX_ITERATIONS,
        }
    }
}

/// How fit residuals are weighted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeightingPolicy {
    #[default]
    None,
    /// `w = 1/σ²` with σ taken from the curve's Y error column.
    Instrumental,
    /// `w = 1/|y|` (Poisson counting statistics, `σ² = y`).
    Statistical,
    /// `w = 1/σ²` with σ taken from another column, one value per point of
    /// the fitted range, in dataset row order.
    ArbitraryDataset { name: String, values: Vec<f64> },
}

impl WeightingPolicy {
    pub fn label(&self) -> String {
        match self {
            WeightingPolicy::None => "No weighting".to_string(),
            WeightingPolicy::Instrumental => "Instrumental".to_string(),
            WeightingPolicy::Statistical => "Statistical".to_string(),
            WeightingPolicy::ArbitraryDataset { name, .. } => format!("Arbitrary Dataset: {name}"),
        }
    }
}

/// Initial value and hold flag of one model parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ParameterSetting {
    /// `None` lets the model guess from the data.
    pub initial: Option<f64>,
    /// Held parameters keep their initial value and are not optimized.
    pub held: bool,
}

impl ParameterSetting {
    pub fn free(initial: f64) -> Self {
        Self {
            initial: Some(initial),
            held: false,
        }
    }

    pub fn held(value: f64) -> Self {
        Self {
            initial: Some(value),
            held: true,
        }
    }

    pub fn auto() -> Self {
        Self::default()
    }
}

/// How the fit curve is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitCurveMode {
    /// `points` evenly spaced abscissae over the fitted range.
    Function { points: usize },
    /// The fitted x values themselves.
    AtData,
}

impl Default for FitCurveMode {
    fn default() -> Self {
        FitCurveMode::Function { points: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub model: ModelSpec,
    pub weighting: WeightingPolicy,
    pub range: XRange,
    pub algorithm: FitAlgorithm,
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Empty means "guess everything"; otherwise one entry per parameter.
    pub parameters: Vec<ParameterSetting>,
    pub curve: FitCurveMode,
    /// Scale standard errors by `sqrt(χ²/dof)`.
    pub scale_errors: bool,
    /// Emit one curve per peak for multi-peak models.
    pub emit_peak_curves: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            model: ModelSpec::Linear,
            weighting: WeightingPolicy::None,
            range: XRange::full(),
            algorithm: FitAlgorithm::default(),
            tolerance: 1e-4,
            max_iterations: 1000,
            parameters: Vec::new(),
            curve: FitCurveMode::default(),
            scale_errors: false,
            emit_peak_curves: true,
        }
    }
}

impl FitConfig {
    pub fn new(model: ModelSpec) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    pub fn with_range(mut self, range: XRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_algorithm(mut self, algorithm: FitAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_weighting(mut self, weighting: WeightingPolicy) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<ParameterSetting>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Checks that do not need the data or the built model.
    pub fn validate(&self) -> Result<()> {
        check_tolerance(self.tolerance, "Fit")?;
        check_iterations(self.max_iterations, self.algorithm.iteration_cap(), "Fit")?;
        if let FitCurveMode::Function { points } = self.curve {
            if points < 2 {
                return Err(AnalysisError::new("Fit", ErrorKind::PointCountError { points }));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FFT and FFT filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FftDirection {
    #[default]
    Forward,
    Inverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FftConfig {
    pub direction: FftDirection,
    /// Sampling interval of the input axis; derived from x spacing when `None`.
    pub sampling_interval: Option<f64>,
    /// Divide the amplitude column by `N` (forward only).
    pub normalize: bool,
    /// Center frequency 0 (forward output / inverse input).
    pub shift: bool,
}

impl Default for FftConfig {
    fn default() -> Self {
        Self {
            direction: FftDirection::Forward,
            sampling_interval: None,
            normalize: true,
            shift: true,
        }
    }
}

impl FftConfig {
    pub fn inverse() -> Self {
        Self {
            direction: FftDirection::Inverse,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_sampling_interval(self.sampling_interval, "FFT")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    LowPass { cutoff: f64 },
    HighPass { cutoff: f64 },
    BandPass { low: f64, high: f64 },
    BandBlock { low: f64, high: f64 },
}

impl FilterKind {
    pub fn label(&self) -> &'static str {
        match self {
            FilterKind::LowPass { .. } => "Low Pass FFT Filter",
            FilterKind::HighPass { .. } => "High Pass FFT Filter",
            FilterKind::BandPass { .. } => "Band Pass FFT Filter",
            FilterKind::BandBlock { .. } => "Band Block FFT Filter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub kind: FilterKind,
    /// Add the zero-frequency component back after high-pass / band-pass.
    pub keep_dc_offset: bool,
    pub sampling_interval: Option<f64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: FilterKind::LowPass { cutoff: 1.0 },
            keep_dc_offset: true,
            sampling_interval: None,
        }
    }
}

impl FilterConfig {
    pub fn new(kind: FilterKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let op = self.kind.label();
        let cutoff = |value: f64| -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(AnalysisError::new(op, ErrorKind::InvalidCutoff { value }))
            }
        };
        match self.kind {
            FilterKind::LowPass { cutoff: c } | FilterKind::HighPass { cutoff: c } => cutoff(c)?,
            FilterKind::BandPass { low, high } | FilterKind::BandBlock { low, high } => {
                cutoff(low)?;
                cutoff(high)?;
                if low >= high {
                    return Err(AnalysisError::new(
                        op,
                        ErrorKind::InvalidRange { from: low, to: high },
                    ));
                }
            }
        }
        check_sampling_interval(self.sampling_interval, op)
    }
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationKind {
    /// Zero-padded, no lag wraps around.
    #[default]
    Linear,
    /// Periodic over `max(N₁, N₂)` samples.
    Circular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationNorm {
    #[default]
    None,
    /// Divide by the number of samples.
    Biased,
    /// Divide by the number of overlapping samples at each lag.
    Unbiased,
    /// Divide by `sqrt(Σa²·Σb²)`, so a perfect match at some lag gives 1.
    Coeff,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CorrelationConfig {
    pub kind: CorrelationKind,
    pub normalize: CorrelationNorm,
    /// Lag step; derived from the x spacing of the first curve when `None`.
    pub sampling_interval: Option<f64>,
}

impl CorrelationConfig {
    pub fn validate(&self) -> Result<()> {
        check_sampling_interval(self.sampling_interval, "Correlation")
    }
}

// ---------------------------------------------------------------------------
// Smoothing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SmoothMethod {
    #[default]
    SavitzkyGolay,
    Fft,
    MovingAverage,
}

impl SmoothMethod {
    pub fn label(self) -> &'static str {
        match self {
            SmoothMethod::SavitzkyGolay => "Savitzky-Golay Smoothing",
            SmoothMethod::Fft => "FFT Smoothing",
            SmoothMethod::MovingAverage => "Moving Average Smoothing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothConfig {
    pub method: SmoothMethod,
    /// Window size for moving average and FFT smoothing.
    pub points: usize,
    /// Savitzky–Golay points left of the center.
    pub left_points: usize,
    /// Savitzky–Golay points right of the center.
    pub right_points: usize,
    /// Savitzky–Golay polynomial order (2 when unset).
    pub polynomial_order: Option<usize>,
}

impl Default for SmoothConfig {
    fn default() -> Self {
        Self {
            method: SmoothMethod::SavitzkyGolay,
            points: 5,
            left_points: 2,
            right_points: 2,
            polynomial_order: None,
        }
    }
}

impl SmoothConfig {
    pub fn new(method: SmoothMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Order used by Savitzky–Golay.
    pub fn order(&self) -> usize {
        self.polynomial_order.unwrap_or(2)
    }

    /// Options that are set but have no effect for the selected method.
    pub fn ignored_options(&self) -> Vec<String> {
        match (self.method, self.polynomial_order) {
            (SmoothMethod::SavitzkyGolay, _) | (_, None) => Vec::new(),
            (method, Some(order)) => vec![format!(
                "polynomial order {order} is ignored by {}",
                method.label()
            )],
        }
    }

    pub fn validate(&self) -> Result<()> {
        let op = self.method.label();
        match self.method {
            SmoothMethod::SavitzkyGolay => {
                let window = self.left_points + self.right_points;
                if window == 0 {
                    return Err(AnalysisError::new(op, ErrorKind::PointCountError { points: 0 }));
                }
                if self.order() >= window {
                    return Err(AnalysisError::new(
                        op,
                        ErrorKind::PolynomialOrder {
                            order: self.order(),
                            window,
                        },
                    ));
                }
            }
            SmoothMethod::Fft | SmoothMethod::MovingAverage => {
                if self.points == 0 {
                    return Err(AnalysisError::new(op, ErrorKind::PointCountError { points: 0 }));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Interpolation and integration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationMethod {
    #[default]
    Linear,
    Cubic,
    Akima,
}

impl InterpolationMethod {
    pub fn label(self) -> &'static str {
        match self {
            InterpolationMethod::Linear => "Linear",
            InterpolationMethod::Cubic => "Cubic",
            InterpolationMethod::Akima => "Akima",
        }
    }

    pub fn min_points(self) -> usize {
        match self {
            InterpolationMethod::Linear => 2,
            InterpolationMethod::Cubic | InterpolationMethod::Akima => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    pub method: InterpolationMethod,
    /// Number of output points.
    pub points: usize,
    pub range: XRange,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            method: InterpolationMethod::Linear,
            points: 1000,
            range: XRange::full(),
        }
    }
}

impl InterpolationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.points < 2 {
            return Err(AnalysisError::new(
                "Interpolation",
                ErrorKind::PointCountError {
                    points: self.points,
                },
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Newton–Cotes order: 1 is the trapezoidal rule.
    pub order: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub range: XRange,
    /// Scheme used to evaluate the curve between samples.
    pub method: InterpolationMethod,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            order: 1,
            max_iterations: 20,
            tolerance: 1e-6,
            range: XRange::full(),
            method: InterpolationMethod::Linear,
        }
    }
}

impl IntegrationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=INTEGRATION_MAX_ORDER).contains(&self.order) {
            return Err(AnalysisError::new(
                "Integration",
                ErrorKind::InvalidOrder {
                    order: self.order,
                    max: INTEGRATION_MAX_ORDER,
                },
            ));
        }
        check_iterations(self.max_iterations, INTEGRATION_MAX_ITERATIONS, "Integration")?;
        check_tolerance(self.tolerance, "Integration")
    }
}
