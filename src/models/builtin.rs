//! Built-in model families: straight line, polynomial, exponential and
//! Boltzmann sigmoid.
//!
//! Linear and polynomial models expose a design row, so the fit driver can
//! solve them in closed form. The others provide analytic gradients and a
//! data-driven initial guess.

use nalgebra::{DMatrix, DVector};

use crate::math::{level_crossing, logistic, solve_least_squares};
use crate::models::model::{ExponentialVariant, FitModel};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Unweighted least-squares coefficients for a linear basis.
fn basis_guess(model: &dyn FitModel, x: &[f64], y: &[f64]) -> Option<Vec<f64>> {
    let cols = model.parameter_count();
    if x.len() < cols {
        return None;
    }
    let mut a = DMatrix::<f64>::zeros(x.len(), cols);
    let mut row = vec![0.0; cols];
    for (i, &xi) in x.iter().enumerate() {
        model.linear_basis(xi, &mut row);
        for (j, v) in row.iter().enumerate() {
            a[(i, j)] = *v;
        }
    }
    let b = DVector::from_column_slice(y);
    solve_least_squares(&a, &b).map(|beta| beta.iter().copied().collect())
}

/// `y = A·x + B`.
#[derive(Debug, Clone)]
pub struct LinearModel {
    names: Vec<String>,
}

impl LinearModel {
    pub fn new() -> Self {
        Self {
            names: names(&["A", "B"]),
        }
    }
}

impl Default for LinearModel {
    fn default() -> Self {
        Self::new()
    }
}

impl FitModel for LinearModel {
    fn label(&self) -> &str {
        "Linear"
    }

    fn parameter_names(&self) -> &[String] {
        &self.names
    }

    fn formula(&self) -> String {
        "A*x+B".to_string()
    }

    fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        p[0] * x + p[1]
    }

    fn gradient(&self, x: f64, _p: &[f64], out: &mut [f64]) {
        out[0] = x;
        out[1] = 1.0;
    }

    fn linear_basis(&self, x: f64, out: &mut [f64]) -> bool {
        out[0] = x;
        out[1] = 1.0;
        true
    }

    fn initial_guess(&self, x: &[f64], y: &[f64]) -> Option<Vec<f64>> {
        basis_guess(self, x, y)
    }
}

/// `y = a0 + a1·x + … + an·xⁿ`.
#[derive(Debug, Clone)]
pub struct PolynomialModel {
    order: usize,
    names: Vec<String>,
}

impl PolynomialModel {
    pub fn new(order: usize) -> Self {
        Self {
            order,
            names: (0..=order).map(|k| format!("a{k}")).collect(),
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }
}

impl FitModel for PolynomialModel {
    fn label(&self) -> &str {
        "Poly"
    }

    fn parameter_names(&self) -> &[String] {
        &self.names
    }

    fn formula(&self) -> String {
        let mut out = String::from("a0");
        for k in 1..=self.order {
            match k {
                1 => out.push_str("+a1*x"),
                _ => out.push_str(&format!("+a{k}*x^{k}")),
            }
        }
        out
    }

    fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        // Horner
        p.iter().rev().fold(0.0, |acc, &c| acc * x + c)
    }

    fn gradient(&self, x: f64, _p: &[f64], out: &mut [f64]) {
        self.linear_basis(x, out);
    }

    fn linear_basis(&self, x: f64, out: &mut [f64]) -> bool {
        let mut power = 1.0;
        for v in out.iter_mut().take(self.order + 1) {
            *v = power;
            power *= x;
        }
        true
    }

    fn initial_guess(&self, x: &[f64], y: &[f64]) -> Option<Vec<f64>> {
        basis_guess(self, x, y)
    }
}

/// Sum of one to three exponential terms plus an offset.
///
/// Parameter order is `(A1, t1, …, Ak, tk, y0)`; the single-term variants use
/// the bare names `A`, `t`.
#[derive(Debug, Clone)]
pub struct ExponentialModel {
    variant: ExponentialVariant,
    names: Vec<String>,
}

impl ExponentialModel {
    pub fn new(variant: ExponentialVariant) -> Self {
        let names = match variant.terms() {
            1 => names(&["A", "t", "y0"]),
            k => {
                let mut v = Vec::with_capacity(2 * k + 1);
                for i in 1..=k {
                    v.push(format!("A{i}"));
                    v.push(format!("t{i}"));
                }
                v.push("y0".to_string());
                v
            }
        };
        Self { variant, names }
    }

    pub fn variant(&self) -> ExponentialVariant {
        self.variant
    }

    fn sign(&self) -> f64 {
        match self.variant {
            ExponentialVariant::Growth => 1.0,
            _ => -1.0,
        }
    }
}

impl FitModel for ExponentialModel {
    fn label(&self) -> &str {
        match self.variant {
            ExponentialVariant::Growth => "ExpGrowth",
            ExponentialVariant::Decay1 => "ExpDecay1",
            ExponentialVariant::Decay2 => "ExpDecay2",
            ExponentialVariant::Decay3 => "ExpDecay3",
        }
    }

    fn parameter_names(&self) -> &[String] {
        &self.names
    }

    fn formula(&self) -> String {
        let k = self.variant.terms();
        let sign = if self.sign() > 0.0 { "" } else { "-" };
        let mut terms: Vec<String> = (0..k)
            .map(|i| {
                let (a, t) = (&self.names[2 * i], &self.names[2 * i + 1]);
                format!("{a}*exp({sign}x/{t})")
            })
            .collect();
        terms.push("y0".to_string());
        terms.join("+")
    }

    fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        let k = self.variant.terms();
        let s = self.sign();
        let mut y = p[2 * k];
        for i in 0..k {
            y += p[2 * i] * (s * x / p[2 * i + 1]).exp();
        }
        y
    }

    fn gradient(&self, x: f64, p: &[f64], out: &mut [f64]) {
        let k = self.variant.terms();
        let s = self.sign();
        for i in 0..k {
            let (a, t) = (p[2 * i], p[2 * i + 1]);
            let e = (s * x / t).exp();
            out[2 * i] = e;
            out[2 * i + 1] = -s * a * e * x / (t * t);
        }
        out[2 * k] = 1.0;
    }

    /// Offset and amplitude from the extrema, time constant from the
    /// half-decay point.
    fn initial_guess(&self, x: &[f64], y: &[f64]) -> Option<Vec<f64>> {
        let n = x.len();
        if n < 2 {
            return None;
        }
        let (lo, hi) = y
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(l, h), &v| (l.min(v), h.max(v)));
        let span = x[n - 1] - x[0];
        let growth = self.sign() > 0.0;

        // The "start" of the curve is where the exponential term is largest:
        // the left end for decays, the right end for growth.
        let (start, end) = if growth { (n - 1, 0) } else { (0, n - 1) };
        let (y0, amplitude) = if y[start] >= y[end] {
            (lo, hi - lo)
        } else {
            (hi, lo - hi)
        };
        let half = y0 + 0.5 * amplitude;
        let t = level_crossing(x, y, start, half, growth)
            .map(|xh| (xh - x[start]).abs() / std::f64::consts::LN_2)
            .filter(|t| t.is_finite() && *t > 0.0)
            .unwrap_or(span.abs() / 3.0)
            .max(f64::EPSILON);

        let k = self.variant.terms();
        let scales: &[f64] = match k {
            1 => &[1.0],
            2 => &[0.5, 2.0],
            _ => &[0.3, 1.0, 3.0],
        };
        let s = self.sign();
        let mut guess = Vec::with_capacity(2 * k + 1);
        for &scale in scales {
            let ti = t * scale;
            // Amplitude is defined at x = 0; rescale from the start abscissa.
            guess.push(amplitude / k as f64 * (-s * x[start] / ti).exp());
            guess.push(ti);
        }
        guess.push(y0);
        guess.iter().all(|v| v.is_finite()).then_some(guess)
    }
}

/// Boltzmann sigmoid `y = A2 + (A1 - A2) / (1 + exp((x - x0)/dx))`.
#[derive(Debug, Clone)]
pub struct BoltzmannModel {
    names: Vec<String>,
}

impl BoltzmannModel {
    pub fn new() -> Self {
        Self {
            names: names(&["A1", "A2", "x0", "dx"]),
        }
    }
}

impl Default for BoltzmannModel {
    fn default() -> Self {
        Self::new()
    }
}

impl FitModel for BoltzmannModel {
    fn label(&self) -> &str {
        "Boltzmann"
    }

    fn parameter_names(&self) -> &[String] {
        &self.names
    }

    fn formula(&self) -> String {
        "(A1-A2)/(1+exp((x-x0)/dx))+A2".to_string()
    }

    fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        let s = logistic((x - p[2]) / p[3]);
        p[1] + (p[0] - p[1]) * s
    }

    fn gradient(&self, x: f64, p: &[f64], out: &mut [f64]) {
        let z = (x - p[2]) / p[3];
        let s = logistic(z);
        // d/dz logistic(z) = -s(1-s)
        let ds = s * (1.0 - s);
        let amp = p[0] - p[1];
        out[0] = s;
        out[1] = 1.0 - s;
        out[2] = amp * ds / p[3];
        out[3] = amp * ds * z / p[3];
    }

    fn initial_guess(&self, x: &[f64], y: &[f64]) -> Option<Vec<f64>> {
        let n = x.len();
        if n < 2 {
            return None;
        }
        let (a1, a2) = (y[0], y[n - 1]);
        let span = x[n - 1] - x[0];
        let x0 = level_crossing(x, y, 0, 0.5 * (a1 + a2), false).unwrap_or(x[0] + 0.5 * span);
        let dx = (span / 10.0).abs().max(f64::EPSILON);
        Some(vec![a1, a2, x0, dx])
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::models::model::numeric_gradient;

    fn check_gradient(model: &dyn FitModel, x: f64, p: &[f64]) {
        let mut analytic = vec![0.0; p.len()];
        let mut numeric = vec![0.0; p.len()];
        model.gradient(x, p, &mut analytic);
        numeric_gradient(model, x, p, &mut numeric);
        for (a, n) in analytic.iter().zip(&numeric) {
            assert_relative_eq!(*a, *n, epsilon = 1e-6, max_relative = 1e-5);
        }
    }

    #[test]
    fn polynomial_evaluates_with_horner() {
        let m = PolynomialModel::new(2);
        assert_eq!(m.parameter_names(), ["a0", "a1", "a2"]);
        assert_eq!(m.evaluate(2.0, &[1.0, 2.0, 3.0]), 17.0);
        assert_eq!(m.formula(), "a0+a1*x+a2*x^2");
    }

    #[test]
    fn linear_guess_is_least_squares() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 3.0).collect();
        let g = LinearModel::new().initial_guess(&x, &y).unwrap();
        assert_relative_eq!(g[0], 2.0, epsilon = 1e-10);
        assert_relative_eq!(g[1], 3.0, epsilon = 1e-10);
    }

    #[test]
    fn exponential_parameter_orders() {
        let m = ExponentialModel::new(ExponentialVariant::Decay3);
        assert_eq!(
            m.parameter_names(),
            ["A1", "t1", "A2", "t2", "A3", "t3", "y0"]
        );
        assert_eq!(
            ExponentialModel::new(ExponentialVariant::Growth).parameter_names(),
            ["A", "t", "y0"]
        );
    }

    #[test]
    fn analytic_gradients_match_numeric() {
        check_gradient(&ExponentialModel::new(ExponentialVariant::Decay2), 0.7, &[2.0, 1.5, 1.0, 4.0, 0.3]);
        check_gradient(&ExponentialModel::new(ExponentialVariant::Growth), 0.7, &[2.0, 1.5, 0.3]);
        check_gradient(&BoltzmannModel::new(), 0.4, &[1.0, 5.0, 0.2, 0.8]);
    }

    #[test]
    fn decay_guess_recovers_time_constant() {
        let x: Vec<f64> = (0..60).map(|i| 1.0 + i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|v| 8.0 * (-v / 1.2).exp() + 0.5).collect();
        let m = ExponentialModel::new(ExponentialVariant::Decay1);
        let g = m.initial_guess(&x, &y).unwrap();
        assert_relative_eq!(g[1], 1.2, max_relative = 0.15);
        assert!(g[0] > 0.0);
        assert!(g[2] < 1.0);
    }

    #[test]
    fn boltzmann_guess_finds_midpoint() {
        let m = BoltzmannModel::new();
        let x: Vec<f64> = (0..41).map(|i| -10.0 + i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|&v| m.evaluate(v, &[0.0, 10.0, 2.0, 1.0])).collect();
        let g = m.initial_guess(&x, &y).unwrap();
        assert_relative_eq!(g[2], 2.0, epsilon = 0.2);
    }
}
