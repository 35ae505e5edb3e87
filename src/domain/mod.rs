//! Domain types used throughout the analysis core.
//!
//! This module defines:
//!
//! - input data (`Dataset`) and range bounds (`RangeBound`, `XRange`)
//! - per-operation configuration (`FitConfig`, `FftConfig`, `SmoothConfig`, ...)
//! - fit outputs (`FitResult`, `FitStatus`, `PeakRow`) and result tables

pub mod config;
pub mod results;
pub mod types;

pub use config::*;
pub use results::*;
pub use types::*;
