//! Nelder–Mead simplex on χ², for models without derivatives.
//!
//! Runs `argmin`'s Nelder–Mead in rounds: each round starts a fresh simplex
//! around the best point so far and stops when the spread of the vertex costs
//! drops below `tol·χ²`. The fit has converged when a round no longer improves
//! χ² by more than `tol` relative. Iterations are summed over rounds and
//! capped by `max_iterations`.

use argmin::core::{CostFunction, Executor, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use tracing::debug;

use crate::domain::FitStatus;
use crate::fit::lm::SolverOutcome;
use crate::fit::problem::FitProblem;

/// Cost function for argmin: χ² over the free parameters.
struct ChiSquare<'p, 'm> {
    problem: &'p FitProblem<'m>,
}

impl CostFunction for ChiSquare<'_, '_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, free: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let chi2 = self.problem.cost(&self.problem.expand(free));
        Ok(if chi2.is_finite() { chi2 } else { f64::MAX })
    }
}

/// Initial simplex: the start point plus one vertex per parameter, displaced by
/// 10% of its value (0.1 for zero values).
fn initial_simplex(start: &[f64]) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(start.len() + 1);
    simplex.push(start.to_vec());
    for i in 0..start.len() {
        let mut vertex = start.to_vec();
        vertex[i] += if start[i] != 0.0 { 0.1 * start[i] } else { 0.1 };
        simplex.push(vertex);
    }
    simplex
}

pub fn nelder_mead(problem: &FitProblem<'_>, tol: f64, max_iterations: usize) -> SolverOutcome {
    let mut best = problem.free_values(problem.start());
    if best.is_empty() {
        return SolverOutcome {
            params: problem.start().to_vec(),
            iterations: 0,
            status: FitStatus::Converged,
        };
    }
    let mut best_cost = problem.cost(problem.start());
    if !best_cost.is_finite() {
        return SolverOutcome {
            params: problem.start().to_vec(),
            iterations: 0,
            status: FitStatus::Failed {
                reason: "non-finite residuals at the initial parameters".to_string(),
            },
        };
    }
    let floor = 1e-30 * problem.y().iter().map(|v| v * v).sum::<f64>().max(1.0);
    let mut iterations = 0usize;

    loop {
        let remaining = max_iterations.saturating_sub(iterations);
        if remaining == 0 {
            return SolverOutcome {
                params: problem.expand(&best),
                iterations,
                status: FitStatus::MaxIterationsReached,
            };
        }

        let sd_tolerance = tol * best_cost.max(f64::MIN_POSITIVE);
        let solver = match NelderMead::new(initial_simplex(&best)).with_sd_tolerance(sd_tolerance) {
            Ok(s) => s,
            Err(e) => {
                return SolverOutcome {
                    params: problem.expand(&best),
                    iterations,
                    status: FitStatus::Failed {
                        reason: e.to_string(),
                    },
                };
            }
        };
        let run = Executor::new(ChiSquare { problem }, solver)
            .configure(|state| state.max_iters(remaining as u64))
            .run();
        let result = match run {
            Ok(r) => r,
            Err(e) => {
                return SolverOutcome {
                    params: problem.expand(&best),
                    iterations,
                    status: FitStatus::Failed {
                        reason: e.to_string(),
                    },
                };
            }
        };

        let state = result.state();
        iterations += state.iter as usize;
        let previous = best_cost;
        if let Some(param) = state.best_param.as_ref() {
            if state.best_cost < best_cost {
                best = param.clone();
                best_cost = state.best_cost;
            }
        }
        debug!(iterations, chi_square = best_cost, "simplex round finished");

        if matches!(
            state.termination_status,
            TerminationStatus::Terminated(TerminationReason::MaxItersReached)
        ) {
            return SolverOutcome {
                params: problem.expand(&best),
                iterations,
                status: FitStatus::MaxIterationsReached,
            };
        }

        let improvement = if previous > 0.0 {
            (previous - best_cost) / previous
        } else {
            0.0
        };
        if improvement <= tol || best_cost <= floor {
            return SolverOutcome {
                params: problem.expand(&best),
                iterations,
                status: FitStatus::Converged,
            };
        }
    }
}
