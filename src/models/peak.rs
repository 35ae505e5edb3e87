//! Peak models: single Gaussian / Lorentzian / GaussAmp and sums of `k`
//! identical kernels sharing one baseline.
//!
//! Parameter layout is `(A1, xc1, w1, …, Ak, xck, wk, y0)`; single-peak
//! models use the bare names `(A, xc, w, y0)`.
//!
//! Width conventions:
//! - Gaussian and GaussAmp: `w` is the standard deviation σ
//! - Lorentzian: `w` is the full width at half maximum
//!
//! `A` is the area, except for GaussAmp where it is the height.

use std::f64::consts::PI;

use crate::domain::PeakRow;
use crate::error::Result;
use crate::math::{
    GAUSSIAN_FWHM_PER_SIGMA, alloc_buffer, argmax, full_width_half_max, gaussian_area,
    gaussian_height, gaussian_unit_area, gaussian_unit_height, lorentzian_area,
    lorentzian_height, lorentzian_unit_area,
};
use crate::models::model::{FitModel, PeakKind, PeakSeed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakShape {
    Gaussian,
    Lorentzian,
    GaussAmp,
}

impl From<PeakKind> for PeakShape {
    fn from(kind: PeakKind) -> Self {
        match kind {
            PeakKind::Gaussian => PeakShape::Gaussian,
            PeakKind::Lorentzian => PeakShape::Lorentzian,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeakModel {
    shape: PeakShape,
    peaks: usize,
    multi: bool,
    seeds: Vec<PeakSeed>,
    names: Vec<String>,
}

impl PeakModel {
    pub fn single(shape: PeakShape) -> Self {
        Self {
            shape,
            peaks: 1,
            multi: false,
            seeds: Vec::new(),
            names: ["A", "xc", "w", "y0"].iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn multi(kind: PeakKind, peaks: usize, seeds: Vec<PeakSeed>) -> Self {
        let mut names = Vec::with_capacity(3 * peaks + 1);
        for i in 1..=peaks {
            names.push(format!("A{i}"));
            names.push(format!("xc{i}"));
            names.push(format!("w{i}"));
        }
        names.push("y0".to_string());
        Self {
            shape: kind.into(),
            peaks,
            multi: true,
            seeds,
            names,
        }
    }

    pub fn shape(&self) -> PeakShape {
        self.shape
    }

    pub fn peaks(&self) -> usize {
        self.peaks
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    /// Value of peak `i` alone (no baseline).
    pub fn kernel(&self, i: usize, x: f64, p: &[f64]) -> f64 {
        let (a, xc, w) = (p[3 * i], p[3 * i + 1], p[3 * i + 2]);
        match self.shape {
            PeakShape::Gaussian => a * gaussian_unit_area(x, xc, w),
            PeakShape::Lorentzian => a * lorentzian_unit_area(x, xc, w),
            PeakShape::GaussAmp => a * gaussian_unit_height(x, xc, w),
        }
    }

    /// Area, center, width and height of every peak.
    pub fn rows(&self, p: &[f64]) -> Vec<PeakRow> {
        (0..self.peaks)
            .map(|i| {
                let (a, xc, w) = (p[3 * i], p[3 * i + 1], p[3 * i + 2]);
                let (area, height) = match self.shape {
                    PeakShape::Gaussian => (a, gaussian_height(a, w)),
                    PeakShape::Lorentzian => (a, lorentzian_height(a, w)),
                    PeakShape::GaussAmp => (gaussian_area(a, w), a),
                };
                PeakRow {
                    area,
                    center: xc,
                    width: w,
                    height,
                }
            })
            .collect()
    }

    /// Peak `i` plus the shared baseline, sampled at `x`.
    pub fn peak_curve(&self, i: usize, x: &[f64], p: &[f64]) -> Result<Vec<f64>> {
        let mut out = alloc_buffer(x.len(), "Fit")?;
        let y0 = p[3 * self.peaks];
        for (v, &xi) in out.iter_mut().zip(x) {
            *v = self.kernel(i, xi, p) + y0;
        }
        Ok(out)
    }

    fn term_formula(&self, suffix: &str) -> String {
        let (a, xc, w) = (format!("A{suffix}"), format!("xc{suffix}"), format!("w{suffix}"));
        match self.shape {
            PeakShape::Gaussian => {
                format!("{a}/({w}*sqrt(2*pi))*exp(-(x-{xc})^2/(2*{w}^2))")
            }
            PeakShape::Lorentzian => format!("2*{a}/pi*{w}/(4*(x-{xc})^2+{w}^2)"),
            PeakShape::GaussAmp => format!("{a}*exp(-(x-{xc})^2/(2*{w}^2))"),
        }
    }

    /// Width parameter for a measured full width at half maximum.
    fn width_from_fwhm(&self, fwhm: f64) -> f64 {
        match self.shape {
            PeakShape::Lorentzian => fwhm,
            PeakShape::Gaussian | PeakShape::GaussAmp => fwhm / GAUSSIAN_FWHM_PER_SIGMA,
        }
    }

    /// Amplitude parameter for a peak of the given height and width.
    fn amplitude_from_height(&self, height: f64, w: f64) -> f64 {
        match self.shape {
            PeakShape::Gaussian => gaussian_area(height, w),
            PeakShape::Lorentzian => lorentzian_area(height, w),
            PeakShape::GaussAmp => height,
        }
    }

    /// Indices of local maxima, tallest first.
    fn local_maxima(y: &[f64]) -> Vec<usize> {
        let n = y.len();
        let mut idx: Vec<usize> = (0..n)
            .filter(|&i| {
                let left = i == 0 || y[i] >= y[i - 1];
                let right = i + 1 == n || y[i] > y[i + 1];
                left && right
            })
            .collect();
        idx.sort_by(|&a, &b| y[b].partial_cmp(&y[a]).unwrap_or(std::cmp::Ordering::Equal));
        idx
    }

    fn nearest_index(x: &[f64], target: f64) -> usize {
        x.iter()
            .enumerate()
            .min_by(|a, b| {
                (a.1 - target)
                    .abs()
                    .partial_cmp(&(b.1 - target).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

impl FitModel for PeakModel {
    fn label(&self) -> &str {
        if self.multi {
            return "MultiPeak";
        }
        match self.shape {
            PeakShape::Gaussian => "Gauss",
            PeakShape::Lorentzian => "Lorentz",
            PeakShape::GaussAmp => "GaussAmp",
        }
    }

    fn parameter_names(&self) -> &[String] {
        &self.names
    }

    fn formula(&self) -> String {
        let mut terms: Vec<String> = if self.multi {
            (1..=self.peaks).map(|i| self.term_formula(&i.to_string())).collect()
        } else {
            vec![self.term_formula("")]
        };
        terms.push("y0".to_string());
        terms.join("+")
    }

    fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        let y0 = p[3 * self.peaks];
        (0..self.peaks).map(|i| self.kernel(i, x, p)).sum::<f64>() + y0
    }

    fn gradient(&self, x: f64, p: &[f64], out: &mut [f64]) {
        for i in 0..self.peaks {
            let (a, xc, w) = (p[3 * i], p[3 * i + 1], p[3 * i + 2]);
            let d = x - xc;
            let g = &mut out[3 * i..3 * i + 3];
            match self.shape {
                PeakShape::Gaussian => {
                    let u = gaussian_unit_area(x, xc, w);
                    g[0] = u;
                    g[1] = a * u * d / (w * w);
                    g[2] = a * u * (d * d / (w * w * w) - 1.0 / w);
                }
                PeakShape::GaussAmp => {
                    let u = gaussian_unit_height(x, xc, w);
                    g[0] = u;
                    g[1] = a * u * d / (w * w);
                    g[2] = a * u * d * d / (w * w * w);
                }
                PeakShape::Lorentzian => {
                    let den = 4.0 * d * d + w * w;
                    g[0] = 2.0 / PI * w / den;
                    g[1] = 2.0 * a / PI * 8.0 * d * w / (den * den);
                    g[2] = 2.0 * a / PI * (4.0 * d * d - w * w) / (den * den);
                }
            }
        }
        out[3 * self.peaks] = 1.0;
    }

    /// Baseline from the minimum, heights above it, centers at the maxima and
    /// widths from the full width at half maximum.
    fn initial_guess(&self, x: &[f64], y: &[f64]) -> Option<Vec<f64>> {
        if x.len() < 2 {
            return None;
        }
        let baseline = y.iter().copied().fold(f64::INFINITY, f64::min);
        let top = argmax(y)?;
        let span = x[x.len() - 1] - x[0];

        let mut centers: Vec<usize> = if !self.seeds.is_empty() {
            self.seeds.iter().map(|s| Self::nearest_index(x, s.center)).collect()
        } else if self.multi {
            Self::local_maxima(y)
        } else {
            vec![top]
        };
        centers.truncate(self.peaks);

        let mut guess = Vec::with_capacity(3 * self.peaks + 1);
        for i in 0..self.peaks {
            let (xc, height, fwhm) = match centers.get(i) {
                Some(&idx) => {
                    let seed = self.seeds.get(i);
                    let xc = seed.map_or(x[idx], |s| s.center);
                    let h = seed.map_or(y[idx] - baseline, |s| s.height - baseline);
                    (xc, h, full_width_half_max(x, y, idx, baseline))
                }
                // Fewer maxima than peaks: spread the rest over the range.
                None => {
                    let xc = x[0] + span * (i + 1) as f64 / (self.peaks + 1) as f64;
                    let h = 0.5 * (y[top] - baseline);
                    (xc, h, 0.25 * span.abs() / self.peaks as f64)
                }
            };
            let w = self.width_from_fwhm(fwhm.max(f64::EPSILON));
            guess.push(self.amplitude_from_height(height, w));
            guess.push(xc);
            guess.push(w);
        }
        guess.push(baseline);
        guess.iter().all(|v| v.is_finite()).then_some(guess)
    }

    fn peak_model(&self) -> Option<&PeakModel> {
        Some(self)
    }
}
