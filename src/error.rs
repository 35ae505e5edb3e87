//! Error taxonomy shared by every analysis operation.
//!
//! Validation problems are detected before any numeric work starts and are
//! returned as an [`AnalysisError`]: the operation label plus an [`ErrorKind`]
//! carrying the offending names and values, so a host can render a precise
//! message without further lookups.
//!
//! Soft fit failures (iteration cap reached, numerical breakdown mid-iteration)
//! are not errors; they travel on `FitResult::status`.

/// What went wrong, with the values needed to explain it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ErrorKind {
    #[error("insufficient data: need at least {required} points, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("invalid range [{from}, {to}]")]
    InvalidRange { from: f64, to: f64 },

    #[error("dataset '{dataset}' has a repeated x value {x}")]
    DuplicateAbscissa { dataset: String, x: f64 },

    #[error(
        "the response dataset '{response}' ({response_len} points) must be less than half the size of the signal dataset '{signal}' ({signal_len} points)"
    )]
    ResponseSize {
        signal: String,
        response: String,
        signal_len: usize,
        response_len: usize,
    },

    #[error(
        "the response dataset '{response}' must contain an odd number of points (got {response_len}) to be used with signal '{signal}'"
    )]
    ResponseParity {
        signal: String,
        response: String,
        response_len: usize,
    },

    #[error("the curve '{dataset}' has no associated Y error column; instrumental weighting is unavailable")]
    MissingWeightColumn { dataset: String },

    #[error("polynomial order {order} must be less than the window size {window} (left + right points)")]
    PolynomialOrder { order: usize, window: usize },

    #[error("tolerance {tolerance} must lie in the open interval (0, 1)")]
    ToleranceOutOfRange { tolerance: f64 },

    #[error("could not allocate a buffer of {len} values")]
    AllocationFailure { len: usize },

    #[error("transform failed: {reason}")]
    TransformError { reason: String },

    #[error("model '{model}' has no gradient; {algorithm} needs one")]
    UnsupportedAlgorithmForModel { model: String, algorithm: String },

    #[error("x and y columns differ in length ({x} vs {y})")]
    LengthMismatch { x: usize, y: usize },

    #[error("dataset '{dataset}' contains non-finite values")]
    NonFiniteData { dataset: String },

    #[error("dataset '{dataset}' is not uniformly sampled")]
    NonUniformSampling { dataset: String },

    #[error("invalid cutoff frequency {value}: must be finite and > 0")]
    InvalidCutoff { value: f64 },

    #[error("invalid sampling interval {value}: must be finite and > 0")]
    InvalidSamplingInterval { value: f64 },

    #[error("integration order {order} must be between 1 and {max}")]
    InvalidOrder { order: usize, max: usize },

    #[error("point count must be positive, got {points}")]
    PointCountError { points: usize },

    #[error("iteration limit {requested} must be between 1 and {cap}")]
    InvalidIterationLimit { requested: usize, cap: usize },

    #[error("expected {expected} parameter settings, got {actual}")]
    ParameterCountMismatch { expected: usize, actual: usize },

    #[error("parameter '{parameter}' needs an explicit initial value")]
    MissingInitialGuess { parameter: String },

    #[error("weighting dataset '{dataset}' has {actual} values, the fitted range has {expected}")]
    WeightLengthMismatch {
        dataset: String,
        expected: usize,
        actual: usize,
    },

    #[error("weight at index {index} is invalid ({value})")]
    InvalidWeight { index: usize, value: f64 },

    #[error("cannot parse '{expression}': {message}")]
    ExpressionError { expression: String, message: String },

    #[error("unknown model or function '{name}'")]
    UnknownModel { name: String },

    #[error("function '{name}' is defined recursively ({cycle})")]
    RecursiveDefinitionError { name: String, cycle: String },

    #[error("response spectrum vanishes at frequency bin {bin}; cannot deconvolve")]
    ResponseSpectrumZero { bin: usize },
}

/// An [`ErrorKind`] tagged with the operation that raised it.
#[derive(Clone, PartialEq)]
pub struct AnalysisError {
    operation: String,
    kind: ErrorKind,
}

impl AnalysisError {
    pub fn new(operation: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            operation: operation.into(),
            kind,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Re-label an error raised by a shared helper with the caller's operation.
    pub fn in_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.operation, self.kind)
    }
}

impl std::fmt::Debug for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisError")
            .field("operation", &self.operation)
            .field("kind", &self.kind)
            .finish()
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_operation_and_values() {
        let err = AnalysisError::new(
            "Fit",
            ErrorKind::InsufficientData {
                required: 4,
                available: 2,
            },
        );
        assert_eq!(
            err.to_string(),
            "Fit: insufficient data: need at least 4 points, got 2"
        );
    }

    #[test]
    fn response_errors_name_both_datasets() {
        let err = AnalysisError::new(
            "Convolution",
            ErrorKind::ResponseParity {
                signal: "Signal".into(),
                response: "Kernel".into(),
                response_len: 4,
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("Signal") && msg.contains("Kernel"), "{msg}");
    }

    #[test]
    fn relabel_keeps_kind() {
        let err = AnalysisError::new("Dataset", ErrorKind::PointCountError { points: 0 })
            .in_operation("Smoothing");
        assert_eq!(err.operation(), "Smoothing");
        assert_eq!(err.kind(), &ErrorKind::PointCountError { points: 0 });
    }
}
