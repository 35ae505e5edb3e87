//! Fit models.
//!
//! - `model`: the `FitModel` capability trait and the `ModelSpec` selector
//! - `builtin`: linear, polynomial, exponential and Boltzmann families
//! - `peak`: Gaussian / Lorentzian / GaussAmp and multi-peak sums
//! - `expression`: user expression language
//! - `registry`: named user functions and plugin models

pub mod builtin;
pub mod expression;
pub mod model;
pub mod peak;
pub mod registry;

pub use builtin::*;
pub use expression::*;
pub use model::*;
pub use peak::*;
pub use registry::*;
