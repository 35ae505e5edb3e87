//! Curve analysis: resampling, definite integrals and derivatives.

pub mod differentiation;
pub mod integration;
pub mod interpolation;

pub use differentiation::*;
pub use integration::*;
pub use interpolation::*;
