//! `plot-analysis` library crate.
//!
//! The numerical core of a scientific plotting application: curve fitting,
//! FFT and FFT filters, convolution and correlation, smoothing,
//! interpolation, integration and differentiation.
//!
//! Every operation takes a [`domain::Dataset`] plus a plain configuration
//! struct and returns fresh, owned results. Nothing here draws, prompts or
//! installs a `tracing` subscriber; that belongs to the host.

pub mod analysis;
pub mod domain;
pub mod error;
pub mod fit;
pub mod math;
pub mod models;
pub mod report;
pub mod signal;
