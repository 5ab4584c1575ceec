//! Newton-type trajectory optimization (component C5): linearize the
//! nonlinear dynamics and cost around the current guess, solve the resulting
//! time-varying affine LQR subproblem for a descent direction, and take an
//! Armijo-backtracked step along the *nonlinear* closed-loop rollout it
//! induces. Ported from the reference `Newton` outer loop, generalized over
//! any [`Dynamics`] plugin instead of being wired to one model.

use nalgebra::SVector;
use tracing::{info, instrument, trace, warn};

use crate::affine_lqr::AffineLqrProblem;
use crate::config::{ArmijoConfig, NewtonConfig};
use crate::cost::{stage_cost, terminal_cost, CostWeights};
use crate::dynamics::Dynamics;
use crate::errors::{Component, EngineError};

/// Why a [`NewtonOptimizer::solve`] run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewtonOutcome {
    /// Descent magnitude fell at or below `term_tol`.
    Converged,
    /// `k_max` iterations elapsed without convergence.
    IterationLimit,
    /// The caller's cancellation flag was observed between iterations.
    Cancelled,
}

/// Result of a full Newton solve.
pub struct NewtonResult<const NS: usize, const NI: usize> {
    pub x: Vec<SVector<f64, NS>>,
    pub u: Vec<SVector<f64, NI>>,
    pub outcome: NewtonOutcome,
    pub iterations: usize,
    /// Cost `J^k` at the end of each completed iteration, if history was requested.
    pub cost_history: Option<Vec<f64>>,
    /// Descent magnitude `d^k` at the end of each completed iteration, if requested.
    pub descent_history: Option<Vec<f64>>,
}

/// Double-buffered workspace for one Newton solve: `current`/`next` are
/// swapped rather than reallocated each iteration.
struct Workspace<const NS: usize, const NI: usize> {
    current_x: Vec<SVector<f64, NS>>,
    current_u: Vec<SVector<f64, NI>>,
    next_x: Vec<SVector<f64, NS>>,
    next_u: Vec<SVector<f64, NI>>,
}

impl<const NS: usize, const NI: usize> Workspace<NS, NI> {
    fn new(x0_guess: Vec<SVector<f64, NS>>, u0_guess: Vec<SVector<f64, NI>>) -> Self {
        let next_x = x0_guess.clone();
        let next_u = u0_guess.clone();
        Self {
            current_x: x0_guess,
            current_u: u0_guess,
            next_x,
            next_u,
        }
    }

    fn commit(&mut self) {
        std::mem::swap(&mut self.current_x, &mut self.next_x);
        std::mem::swap(&mut self.current_u, &mut self.next_u);
    }
}

/// Trajectory optimizer generic over a dynamics plugin `D` and its const
/// generic `NS`/`NI`. Holds nothing but configuration and weights; the
/// trajectory being optimized lives entirely in the `solve` call's workspace.
pub struct NewtonOptimizer<const NS: usize, const NI: usize, D: Dynamics<NS, NI>> {
    pub dynamics: D,
    pub weights: CostWeights<NS, NI>,
    pub armijo: ArmijoConfig,
    pub newton: NewtonConfig,
}

impl<const NS: usize, const NI: usize, D: Dynamics<NS, NI>> NewtonOptimizer<NS, NI, D> {
    pub fn new(dynamics: D, weights: CostWeights<NS, NI>, armijo: ArmijoConfig, newton: NewtonConfig) -> Self {
        Self { dynamics, weights, armijo, newton }
    }

    fn total_cost(
        &self,
        x: &[SVector<f64, NS>],
        u: &[SVector<f64, NI>],
        x_ref: &[SVector<f64, NS>],
        u_ref: &[SVector<f64, NI>],
    ) -> f64 {
        let t_minus_1 = u.len();
        let mut total = 0.0;
        for t in 0..t_minus_1 {
            total += stage_cost(&self.weights, &x[t], &u[t], &x_ref[t], &u_ref[t]).value;
        }
        total += terminal_cost(&self.weights, &x[t_minus_1], &x_ref[t_minus_1]).0;
        total
    }

    /// Roll out the affine feedback law `u_t = u_t^k + K_t(x_t - x_t^k) +
    /// gamma·sigma_t` through the *nonlinear* dynamics, the trial used by the
    /// Armijo line search.
    fn closed_loop_rollout(
        &self,
        base_x: &[SVector<f64, NS>],
        base_u: &[SVector<f64, NI>],
        k: &[nalgebra::SMatrix<f64, NI, NS>],
        sigma: &[SVector<f64, NI>],
        gamma: f64,
        x0: SVector<f64, NS>,
    ) -> Result<(Vec<SVector<f64, NS>>, Vec<SVector<f64, NI>>), EngineError> {
        let t_minus_1 = base_u.len();
        let mut x = vec![SVector::<f64, NS>::zeros(); t_minus_1 + 1];
        let mut u = vec![SVector::<f64, NI>::zeros(); t_minus_1];
        x[0] = x0;
        for t in 0..t_minus_1 {
            u[t] = base_u[t] + k[t] * (x[t] - base_x[t]) + gamma * sigma[t];
            x[t + 1] = self.dynamics.step(&x[t], &u[t])?.x_next;
        }
        Ok((x, u))
    }

    /// Run the Newton outer loop starting from `(x_init, u_init)`, tracking
    /// `(x_ref, u_ref)`. `cancelled` is polled at iteration and Armijo-trial
    /// boundaries only — never inside the Riccati sweep.
    #[instrument(skip_all, fields(t_horizon = x_init.len()))]
    pub fn solve(
        &self,
        x_init: Vec<SVector<f64, NS>>,
        u_init: Vec<SVector<f64, NI>>,
        x_ref: &[SVector<f64, NS>],
        u_ref: &[SVector<f64, NI>],
        record_history: bool,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<NewtonResult<NS, NI>, EngineError> {
        if x_init.len() != x_ref.len() {
            return Err(EngineError::DimMismatch {
                component: Component::Newton,
                expected: x_init.len(),
                got: x_ref.len(),
            });
        }
        if u_init.len() != u_ref.len() {
            return Err(EngineError::DimMismatch {
                component: Component::Newton,
                expected: u_init.len(),
                got: u_ref.len(),
            });
        }
        if x_init.len() != u_init.len() + 1 {
            return Err(EngineError::DimMismatch {
                component: Component::Newton,
                expected: u_init.len() + 1,
                got: x_init.len(),
            });
        }

        let t_minus_1 = u_init.len();
        let x0 = x_init[0];
        let mut workspace = Workspace::new(x_init, u_init);

        let mut cost_history = record_history.then(Vec::new);
        let mut descent_history = record_history.then(Vec::new);
        let mut outcome = NewtonOutcome::IterationLimit;
        let mut iterations = 0;

        for k in 0..self.newton.k_max {
            if cancelled() {
                outcome = NewtonOutcome::Cancelled;
                break;
            }
            iterations = k + 1;

            let mut a_seq = Vec::with_capacity(t_minus_1);
            let mut b_seq = Vec::with_capacity(t_minus_1);
            let mut q_seq = Vec::with_capacity(t_minus_1);
            let mut r_seq = Vec::with_capacity(t_minus_1);
            let mut q_affine = Vec::with_capacity(t_minus_1);
            let mut r_affine = Vec::with_capacity(t_minus_1);
            let mut cost_k = 0.0;

            for t in 0..t_minus_1 {
                let stepped = self.dynamics.step(&workspace.current_x[t], &workspace.current_u[t])?;
                let derivatives = stage_cost(
                    &self.weights,
                    &workspace.current_x[t],
                    &workspace.current_u[t],
                    &x_ref[t],
                    &u_ref[t],
                );
                cost_k += derivatives.value;
                a_seq.push(stepped.a);
                b_seq.push(stepped.b);
                q_seq.push(derivatives.lxx);
                r_seq.push(derivatives.luu);
                q_affine.push(derivatives.lx);
                r_affine.push(derivatives.lu);
            }
            let (term_value, term_grad, term_hessian) =
                terminal_cost(&self.weights, &workspace.current_x[t_minus_1], &x_ref[t_minus_1]);
            cost_k += term_value;

            // Costate backward sweep, purely to compute the Armijo gradient term.
            let mut lambda = term_grad;
            let mut gradient_dot_du = 0.0;
            let mut du_norm_sq = 0.0;
            let mut dj = vec![SVector::<f64, NI>::zeros(); t_minus_1];
            for t in (0..t_minus_1).rev() {
                dj[t] = b_seq[t].transpose() * lambda + r_affine[t];
                lambda = a_seq[t].transpose() * lambda + q_affine[t];
            }

            let problem = AffineLqrProblem {
                a: a_seq,
                b: b_seq,
                q: q_seq,
                r: r_seq,
                s: vec![nalgebra::SMatrix::<f64, NI, NS>::zeros(); t_minus_1],
                q_affine,
                r_affine,
                q_terminal: term_hessian,
                q_affine_terminal: term_grad,
                // The initial condition is fixed across Newton iterations, so
                // the subproblem is solved for the *deviation* (Delta x, Delta u)
                // with Delta x_0 pinned to zero, not the actual trajectory x0.
                x0: SVector::<f64, NS>::zeros(),
            };
            let solution = problem.solve_affine()?;

            for t in 0..t_minus_1 {
                du_norm_sq += solution.u[t].dot(&solution.u[t]);
                gradient_dot_du += dj[t].dot(&solution.u[t]);
            }
            let descent = du_norm_sq;

            if let Some(history) = cost_history.as_mut() {
                history.push(cost_k);
            }
            if let Some(history) = descent_history.as_mut() {
                history.push(descent);
            }
            trace!(iteration = k, cost = cost_k, descent, "newton iteration");

            if descent <= self.newton.term_tol {
                // `workspace.current` already holds the iterate whose descent
                // was just measured; committing here would swap in `next`,
                // which still holds the *previous* iterate (or, at k=0, the
                // untouched initial guess).
                outcome = NewtonOutcome::Converged;
                break;
            }

            // Armijo backtracking over the nonlinear closed-loop trial rollout.
            let mut gamma = self.armijo.gamma_0;
            let mut accepted = None;
            for trial in 0..self.armijo.max_iters {
                if cancelled() {
                    outcome = NewtonOutcome::Cancelled;
                    break;
                }
                // A trial that blows up the nonlinear rollout (e.g. V·cosβ≈0
                // at an oversized step) is a rejected trial, not a fatal
                // error: backtrack γ the same as a failed sufficient-decrease
                // check and let the line search keep shrinking it.
                let rollout = self.closed_loop_rollout(
                    &workspace.current_x,
                    &workspace.current_u,
                    &solution.k,
                    &solution.sigma,
                    gamma,
                    x0,
                );
                let (trial_x, trial_u) = match rollout {
                    Ok(rolled) => rolled,
                    Err(_) => {
                        gamma *= self.armijo.beta;
                        continue;
                    }
                };
                let trial_cost = self.total_cost(&trial_x, &trial_u, x_ref, u_ref);
                if trial_cost <= cost_k + self.armijo.c * gamma * gradient_dot_du {
                    accepted = Some((trial_x, trial_u, gamma, trial));
                    break;
                }
                gamma *= self.armijo.beta;
            }
            if outcome == NewtonOutcome::Cancelled {
                break;
            }

            let (trial_x, trial_u, gamma, trials) = accepted.ok_or(EngineError::LinesearchFail {
                iteration: k,
                trials: self.armijo.max_iters,
            })?;
            trace!(iteration = k, gamma, trials, "armijo accepted");

            workspace.next_x = trial_x;
            workspace.next_u = trial_u;
            workspace.commit();
        }

        if outcome == NewtonOutcome::IterationLimit {
            warn!(k_max = self.newton.k_max, "newton optimizer hit the iteration limit");
        } else {
            info!(?outcome, iterations, "newton optimizer finished");
        }

        Ok(NewtonResult {
            x: workspace.current_x,
            u: workspace.current_u,
            outcome,
            iterations,
            cost_history,
            descent_history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArmijoConfig, NewtonConfig};
    use crate::cost::pendulum_weights;
    use crate::dynamics::pendulum::{PendulumDynamics, PendulumParams};
    use approx::assert_relative_eq;

    #[test]
    fn converges_on_a_short_pendulum_swing_up() {
        let params = PendulumParams::default();
        let dynamics = PendulumDynamics::new(params);
        let weights = pendulum_weights();
        let optimizer = NewtonOptimizer::new(
            dynamics,
            weights,
            ArmijoConfig::default(),
            NewtonConfig { k_max: 30, term_tol: 1e-6 },
        );

        let t_len = 60;
        let x_ref = vec![SVector::<f64, 2>::new(0.3, 0.0); t_len];
        let u_ref = vec![SVector::<f64, 1>::new(params.k_eq() * 0.3_f64.sin()); t_len - 1];
        let x_init = vec![SVector::<f64, 2>::zeros(); t_len];
        let u_init = vec![SVector::<f64, 1>::zeros(); t_len - 1];

        let result = optimizer
            .solve(x_init, u_init, &x_ref, &u_ref, true, &|| false)
            .unwrap();

        assert_eq!(result.outcome, NewtonOutcome::Converged);
        assert_relative_eq!(result.x.last().unwrap()[0], 0.3, epsilon = 5e-2);
        let history = result.cost_history.unwrap();
        assert!(history.last().unwrap() <= &history[0]);
    }

    #[test]
    fn mismatched_reference_length_is_rejected_at_entry() {
        let params = PendulumParams::default();
        let dynamics = PendulumDynamics::new(params);
        let weights = pendulum_weights();
        let optimizer = NewtonOptimizer::new(
            dynamics,
            weights,
            ArmijoConfig::default(),
            NewtonConfig::default(),
        );

        let x_init = vec![SVector::<f64, 2>::zeros(); 10];
        let u_init = vec![SVector::<f64, 1>::zeros(); 9];
        let x_ref = vec![SVector::<f64, 2>::zeros(); 11]; // wrong length
        let u_ref = vec![SVector::<f64, 1>::zeros(); 9];

        let result = optimizer.solve(x_init, u_init, &x_ref, &u_ref, false, &|| false);
        assert!(matches!(
            result,
            Err(EngineError::DimMismatch { component: Component::Newton, .. })
        ));
    }

    #[test]
    fn cancellation_is_observed_between_iterations() {
        let params = PendulumParams::default();
        let dynamics = PendulumDynamics::new(params);
        let weights = pendulum_weights();
        let optimizer = NewtonOptimizer::new(
            dynamics,
            weights,
            ArmijoConfig::default(),
            NewtonConfig { k_max: 30, term_tol: 1e-6 },
        );

        let t_len = 30;
        let x_ref = vec![SVector::<f64, 2>::new(0.2, 0.0); t_len];
        let u_ref = vec![SVector::<f64, 1>::zeros(); t_len - 1];
        let x_init = vec![SVector::<f64, 2>::zeros(); t_len];
        let u_init = vec![SVector::<f64, 1>::zeros(); t_len - 1];

        let result = optimizer
            .solve(x_init, u_init, &x_ref, &u_ref, false, &|| true)
            .unwrap();
        assert_eq!(result.outcome, NewtonOutcome::Cancelled);
        assert_eq!(result.iterations, 1);
    }
}
