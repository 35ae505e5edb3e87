//! The weighted least-squares problem shared by every solver.
//!
//! Held parameters are folded into a template vector; solvers only see the
//! free ones:
//!
//! ```text
//! r_i   = sqrt(w_i) · (y_i - f(x_i; p))
//! J_ij  = sqrt(w_i) · ∂f/∂p_free[j] (x_i)
//! cost  = Σ r_i²   (χ²)
//! ```

use nalgebra::{DMatrix, DVector};

use crate::models::FitModel;

pub struct FitProblem<'a> {
    model: &'a dyn FitModel,
    x: Vec<f64>,
    y: Vec<f64>,
    sqrt_w: Vec<f64>,
    template: Vec<f64>,
    free: Vec<usize>,
}

impl<'a> FitProblem<'a> {
    pub fn new(
        model: &'a dyn FitModel,
        x: Vec<f64>,
        y: Vec<f64>,
        weights: &[f64],
        start: Vec<f64>,
        held: &[bool],
    ) -> Self {
        let free = (0..start.len()).filter(|&i| !held[i]).collect();
        Self {
            model,
            x,
            y,
            sqrt_w: weights.iter().map(|w| w.sqrt()).collect(),
            template: start,
            free,
        }
    }

    pub fn model(&self) -> &dyn FitModel {
        self.model
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn sqrt_weights(&self) -> &[f64] {
        &self.sqrt_w
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Indices of the optimized parameters.
    pub fn free(&self) -> &[usize] {
        &self.free
    }

    pub fn start(&self) -> &[f64] {
        &self.template
    }

    /// Free values of a full parameter vector.
    pub fn free_values(&self, full: &[f64]) -> Vec<f64> {
        self.free.iter().map(|&i| full[i]).collect()
    }

    /// Full parameter vector with the given free values.
    pub fn expand(&self, free: &[f64]) -> Vec<f64> {
        let mut full = self.template.clone();
        for (&i, &v) in self.free.iter().zip(free) {
            full[i] = v;
        }
        full
    }

    pub fn residuals(&self, full: &[f64], out: &mut DVector<f64>) {
        for i in 0..self.x.len() {
            out[i] = self.sqrt_w[i] * (self.y[i] - self.model.evaluate(self.x[i], full));
        }
    }

    /// χ² at `full`; non-finite when the model misbehaves.
    pub fn cost(&self, full: &[f64]) -> f64 {
        self.x
            .iter()
            .zip(&self.y)
            .zip(&self.sqrt_w)
            .map(|((&x, &y), &s)| {
                let r = s * (y - self.model.evaluate(x, full));
                r * r
            })
            .sum()
    }

    /// Weighted Jacobian over the free parameters.
    pub fn jacobian(&self, full: &[f64], out: &mut DMatrix<f64>) {
        let mut grad = vec![0.0; full.len()];
        for i in 0..self.x.len() {
            self.model.gradient(self.x[i], full, &mut grad);
            for (j, &k) in self.free.iter().enumerate() {
                out[(i, j)] = self.sqrt_w[i] * grad[k];
            }
        }
    }
}
