//! Mathematical utilities: stable model kernels, weighted least squares and the
//! shared numeric helper layer.

pub mod basis;
pub mod numeric;
pub mod ols;

pub use basis::*;
pub use numeric::*;
pub use ols::*;
