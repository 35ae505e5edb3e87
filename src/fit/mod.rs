//! Nonlinear least-squares fitting.
//!
//! - `problem`: residuals and Jacobian over the free parameters
//! - `lm`, `simplex`: the iterative solvers
//! - `weighting`: per-point weights from the weighting policy
//! - `fitter`: validation, solver dispatch and result assembly

pub mod fitter;
pub mod lm;
pub mod problem;
pub mod simplex;
pub mod weighting;

pub use fitter::*;
pub use lm::{SolverOutcome, levenberg_marquardt};
pub use problem::FitProblem;
pub use simplex::nelder_mead;
pub use weighting::fit_weights;
