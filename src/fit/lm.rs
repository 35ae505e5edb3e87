//! Levenberg–Marquardt.
//!
//! Each iteration solves the damped normal equations
//!
//! ```text
//! (JᵀJ + λ·D) δ = Jᵀr
//! ```
//!
//! by Cholesky, retrying with larger `λ` until the step lowers χ². `D` is the
//! identity (unscaled) or the running maximum of `diag(JᵀJ)` (scaled), which
//! makes the damping invariant to parameter units.
//!
//! Convergence:
//! - every step component below `tol·(|p| + tol)`
//! - relative χ² drop below `tol` once the damping is small
//! - χ² numerically zero
//! - no step lowers χ² any more (numerical minimum)
//!
//! Failure (status, not error): a parameter with no effect on the model
//! (zero Jacobian column), non-finite Jacobian or step.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::domain::FitStatus;
use crate::fit::problem::FitProblem;

const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;
/// Damping increases tried before giving up on an iteration.
const MAX_DAMPING_TRIES: usize = 40;

/// Parameters and terminal state of a solver run.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    /// Full parameter vector (held values included).
    pub params: Vec<f64>,
    pub iterations: usize,
    pub status: FitStatus,
}

fn failed(params: Vec<f64>, iterations: usize, reason: impl Into<String>) -> SolverOutcome {
    SolverOutcome {
        params,
        iterations,
        status: FitStatus::Failed {
            reason: reason.into(),
        },
    }
}

pub fn levenberg_marquardt(
    problem: &FitProblem<'_>,
    scaled: bool,
    tol: f64,
    max_iterations: usize,
) -> SolverOutcome {
    let mut p = problem.start().to_vec();
    let free = problem.free();
    let m = free.len();
    let n = problem.len();

    if m == 0 {
        return SolverOutcome {
            params: p,
            iterations: 0,
            status: FitStatus::Converged,
        };
    }

    let mut r = DVector::<f64>::zeros(n);
    problem.residuals(&p, &mut r);
    let mut cost = r.norm_squared();
    if !cost.is_finite() {
        return failed(p, 0, "non-finite residuals at the initial parameters");
    }
    let floor = 1e-30 * problem.y().iter().map(|v| v * v).sum::<f64>().max(1.0);

    let mut lambda = LAMBDA_START;
    let mut scale = DVector::<f64>::from_element(m, if scaled { 0.0 } else { 1.0 });
    let mut j = DMatrix::<f64>::zeros(n, m);
    let mut trial_r = DVector::<f64>::zeros(n);

    for iter in 1..=max_iterations {
        problem.jacobian(&p, &mut j);
        if j.iter().any(|v| !v.is_finite()) {
            return failed(p, iter - 1, "non-finite Jacobian");
        }
        let jtj = j.transpose() * &j;
        let g = j.transpose() * &r;

        for k in 0..m {
            let d = jtj[(k, k)];
            if d == 0.0 {
                let name = &problem.model().parameter_names()[free[k]];
                return failed(
                    p,
                    iter - 1,
                    format!("singular Jacobian: parameter '{name}' has no effect on the model"),
                );
            }
            if scaled {
                scale[k] = scale[k].max(d);
            }
        }

        let mut step = None;
        for _ in 0..MAX_DAMPING_TRIES {
            let mut a = jtj.clone();
            for k in 0..m {
                a[(k, k)] += lambda * scale[k];
            }
            let Some(chol) = a.cholesky() else {
                lambda = (lambda * 10.0).min(LAMBDA_MAX);
                continue;
            };
            let delta = chol.solve(&g);
            if delta.iter().any(|v| !v.is_finite()) {
                return failed(p, iter - 1, "non-finite parameter update");
            }

            let mut trial = p.clone();
            for (k, &i) in free.iter().enumerate() {
                trial[i] += delta[k];
            }
            problem.residuals(&trial, &mut trial_r);
            let trial_cost = trial_r.norm_squared();
            if trial_cost.is_finite() && trial_cost < cost {
                step = Some((trial, delta, trial_cost));
                break;
            }
            if lambda >= LAMBDA_MAX {
                break;
            }
            lambda = (lambda * 10.0).min(LAMBDA_MAX);
        }

        let Some((trial, delta, trial_cost)) = step else {
            debug!(iter, cost, "no downhill step; stopping at numerical minimum");
            return SolverOutcome {
                params: p,
                iterations: iter,
                status: FitStatus::Converged,
            };
        };

        let small_step = free
            .iter()
            .enumerate()
            .all(|(k, &i)| delta[k].abs() <= tol * (p[i].abs() + tol));
        let relative_drop = (cost - trial_cost) / cost;

        p = trial;
        std::mem::swap(&mut r, &mut trial_r);
        cost = trial_cost;
        lambda = (lambda / 10.0).max(LAMBDA_MIN);

        if small_step || (relative_drop < tol && lambda <= 1e-2) || cost <= floor {
            return SolverOutcome {
                params: p,
                iterations: iter,
                status: FitStatus::Converged,
            };
        }
    }

    SolverOutcome {
        params: p,
        iterations: max_iterations,
        status: FitStatus::MaxIterationsReached,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::models::{BoltzmannModel, ExponentialModel, ExponentialVariant, FitModel};

    fn problem<'a>(model: &'a dyn FitModel, truth: &[f64], start: Vec<f64>) -> FitProblem<'a> {
        let x: Vec<f64> = (0..80).map(|i| i as f64 * 0.1).collect();
        let y = x.iter().map(|&v| model.evaluate(v, truth)).collect();
        let held = vec![false; start.len()];
        FitProblem::new(model, x, y, &vec![1.0; 80], start, &held)
    }

    #[test]
    fn recovers_exponential_decay_scaled_and_unscaled() {
        let model = ExponentialModel::new(ExponentialVariant::Decay1);
        let truth = [4.0, 1.5, 0.5];
        for scaled in [true, false] {
            let prob = problem(&model, &truth, vec![2.0, 1.0, 0.0]);
            let out = levenberg_marquardt(&prob, scaled, 1e-8, 500);
            assert_eq!(out.status, FitStatus::Converged);
            for (a, b) in out.params.iter().zip(&truth) {
                assert_relative_eq!(*a, *b, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn iteration_cap_is_soft() {
        let model = BoltzmannModel::new();
        let prob = problem(&model, &[0.0, 10.0, 4.0, 0.5], vec![1.0, 8.0, 1.0, 2.0]);
        let out = levenberg_marquardt(&prob, true, 1e-10, 1);
        assert_eq!(out.status, FitStatus::MaxIterationsReached);
        assert_eq!(out.iterations, 1);
        assert!(prob.cost(&out.params) < prob.cost(prob.start()));
    }

    #[test]
    fn parameter_without_effect_fails() {
        let model = ExponentialModel::new(ExponentialVariant::Decay1);
        // With A = 0 the time constant has no influence on the curve.
        let prob = problem(&model, &[0.0, 1.0, 2.0], vec![0.0, 1.0, 1.0]);
        let out = levenberg_marquardt(&prob, true, 1e-6, 100);
        assert!(matches!(out.status, FitStatus::Failed { .. }));
    }
}
