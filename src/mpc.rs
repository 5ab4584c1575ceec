//! Box-constrained receding-horizon MPC (component C7): at every real-time
//! step, solve a prediction-horizon QP built from the same affine-LQR Riccati
//! recursion the Newton optimizer uses (C4), apply only the first input, and
//! re-plan.
//!
//! The prediction model is the linearization `(A*_t, B*_t)` pre-computed
//! around the already-optimized trajectory `(X*, U*)` — not a fresh
//! linearization of the real (possibly perturbed) state. The QP cost
//! penalizes deviation from `(X*, U*)`, not absolute `(x, u)`, so the
//! solved window is always expressed relative to the nominal trajectory
//! and composed back to absolute coordinates before being applied.
//!
//! Hard box bounds (one input channel, one state channel) are enforced by a
//! sequential quadratic-penalty continuation: the same exterior-penalty idea
//! used by classical penalty-method NLP solvers, specialized here to the case
//! where the penalty term is itself quadratic in the LQR decision variables,
//! so each outer round is an exact affine-LQR solve rather than an
//! approximate gradient step. A bound that is still violated past tolerance
//! after the configured number of rounds is reported as [`EngineError::MpcInfeasible`].

use nalgebra::{SMatrix, SVector};
use tracing::{debug, instrument, warn};

use crate::affine_lqr::AffineLqrProblem;
use crate::config::MpcConfig;
use crate::cost::CostWeights;
use crate::dynamics::Dynamics;
use crate::errors::{Component, EngineError};

/// Tolerance below which a bound is considered satisfied.
const FEASIBILITY_TOL: f64 = 1e-6;
/// Initial and per-round growth factor for an activated penalty weight.
const PENALTY_GROWTH: f64 = 10.0;
const PENALTY_INITIAL: f64 = 10.0;

/// Receding-horizon box-constrained controller around a nominal trajectory.
pub struct ConstrainedMpc<const NS: usize, const NI: usize, D: Dynamics<NS, NI>> {
    pub dynamics: D,
    pub weights: CostWeights<NS, NI>,
    pub config: MpcConfig,
}

/// Closed-loop trajectory produced by [`ConstrainedMpc::run`].
pub struct MpcResult<const NS: usize, const NI: usize> {
    pub x: Vec<SVector<f64, NS>>,
    pub u: Vec<SVector<f64, NI>>,
}

/// One prediction-horizon solve, in absolute (not deviation) coordinates.
struct HorizonSolution<const NS: usize, const NI: usize> {
    x: Vec<SVector<f64, NS>>,
    u: Vec<SVector<f64, NI>>,
}

impl<const NS: usize, const NI: usize, D: Dynamics<NS, NI>> ConstrainedMpc<NS, NI, D> {
    pub fn new(dynamics: D, weights: CostWeights<NS, NI>, config: MpcConfig) -> Self {
        Self { dynamics, weights, config }
    }

    /// Solve the box-constrained QP over the prediction window starting at
    /// `x0_abs`, tracking the nominal window `(x_star, u_star)` (length
    /// `t_pred`/`t_pred - 1`, already clamped to the tail of the optimized
    /// trajectory by the caller).
    #[instrument(skip(self, x_star, u_star), fields(real_step))]
    fn solve_horizon(
        &self,
        x_star: &[SVector<f64, NS>],
        u_star: &[SVector<f64, NI>],
        x0_abs: SVector<f64, NS>,
        real_step: usize,
    ) -> Result<HorizonSolution<NS, NI>, EngineError> {
        let t_pred = x_star.len();
        let t_minus_1 = t_pred - 1;
        let (ui, xi) = (self.config.u_index, self.config.x_index);

        let mut a_seq = Vec::with_capacity(t_minus_1);
        let mut b_seq = Vec::with_capacity(t_minus_1);
        for t in 0..t_minus_1 {
            let stepped = self.dynamics.step(&x_star[t], &u_star[t])?;
            a_seq.push(stepped.a);
            b_seq.push(stepped.b);
        }
        let x0_dev = x0_abs - x_star[0];

        // Current penalty weight and deviation-space target per channel;
        // zero means "inactive this round". `x_rho`/`x_target` are indexed
        // `1..t_pred` (the state at t=0 is pinned, not a decision variable).
        let mut u_rho = vec![0.0_f64; t_minus_1];
        let mut u_target = vec![0.0_f64; t_minus_1];
        let mut x_rho = vec![0.0_f64; t_pred];
        let mut x_target = vec![0.0_f64; t_pred];

        for outer in 0..=self.config.max_active_set_iters {
            let mut q_seq = vec![self.weights.q; t_minus_1];
            let mut r_seq = vec![self.weights.r; t_minus_1];
            let mut q_affine = vec![SVector::<f64, NS>::zeros(); t_minus_1];
            let mut r_affine = vec![SVector::<f64, NI>::zeros(); t_minus_1];
            let mut q_terminal = self.weights.q_terminal;
            let mut q_affine_terminal = SVector::<f64, NS>::zeros();

            for t in 0..t_minus_1 {
                if u_rho[t] > 0.0 {
                    r_seq[t][(ui, ui)] += u_rho[t];
                    r_affine[t][ui] += -u_rho[t] * u_target[t];
                }
            }
            for t in 1..t_pred {
                if x_rho[t] <= 0.0 {
                    continue;
                }
                if t < t_minus_1 {
                    q_seq[t][(xi, xi)] += x_rho[t];
                    q_affine[t][xi] += -x_rho[t] * x_target[t];
                } else {
                    q_terminal[(xi, xi)] += x_rho[t];
                    q_affine_terminal[xi] += -x_rho[t] * x_target[t];
                }
            }

            let problem = AffineLqrProblem {
                a: a_seq.clone(),
                b: b_seq.clone(),
                q: q_seq,
                r: r_seq,
                s: vec![SMatrix::<f64, NI, NS>::zeros(); t_minus_1],
                q_affine,
                r_affine,
                q_terminal,
                q_affine_terminal,
                x0: x0_dev,
            };
            let solution = problem.solve_affine()?;

            let mut any_violation = false;
            let mut next_u_rho = vec![0.0_f64; t_minus_1];
            let mut next_u_target = vec![0.0_f64; t_minus_1];
            for t in 0..t_minus_1 {
                let u_abs = u_star[t][ui] + solution.u[t][ui];
                if u_abs > self.config.u_max + FEASIBILITY_TOL {
                    any_violation = true;
                    next_u_rho[t] = bump(u_rho[t]);
                    next_u_target[t] = self.config.u_max - u_star[t][ui];
                } else if u_abs < self.config.u_min - FEASIBILITY_TOL {
                    any_violation = true;
                    next_u_rho[t] = bump(u_rho[t]);
                    next_u_target[t] = self.config.u_min - u_star[t][ui];
                }
            }
            let mut next_x_rho = vec![0.0_f64; t_pred];
            let mut next_x_target = vec![0.0_f64; t_pred];
            for t in 1..t_pred {
                let x_abs = x_star[t][xi] + solution.x[t][xi];
                if x_abs > self.config.x_max + FEASIBILITY_TOL {
                    any_violation = true;
                    next_x_rho[t] = bump(x_rho[t]);
                    next_x_target[t] = self.config.x_max - x_star[t][xi];
                }
            }

            if !any_violation {
                debug!(real_step, rounds = outer, "mpc horizon solved within bounds");
                let x = solution.x.iter().zip(x_star).map(|(dx, xs)| xs + dx).collect();
                let u = solution.u.iter().zip(u_star).map(|(du, us)| us + du).collect();
                return Ok(HorizonSolution { x, u });
            }
            if outer == self.config.max_active_set_iters {
                warn!(real_step, rounds = outer, "mpc penalty continuation failed to reach feasibility");
                return Err(EngineError::MpcInfeasible { time_step: real_step });
            }

            u_rho = next_u_rho;
            u_target = next_u_target;
            x_rho = next_x_rho;
            x_target = next_x_target;
        }
        unreachable!("loop above always returns by its last iteration");
    }

    /// Run the receding-horizon controller for `t_sim` real steps starting
    /// from `x0_real`, applying only `u[0]` of each horizon solve and
    /// advancing the real nonlinear plant. The prediction window at real step
    /// `k` is `(X*, U*)[k .. k + t_pred]`, clamped by holding the last
    /// available sample once the window runs past the end of the optimized
    /// trajectory.
    pub fn run(
        &self,
        x_star: &[SVector<f64, NS>],
        u_star: &[SVector<f64, NI>],
        x0_real: SVector<f64, NS>,
        t_sim: usize,
    ) -> Result<MpcResult<NS, NI>, EngineError> {
        if x_star.len() != u_star.len() + 1 {
            return Err(EngineError::DimMismatch {
                component: Component::Mpc,
                expected: u_star.len() + 1,
                got: x_star.len(),
            });
        }
        if self.config.t_pred < 2 {
            return Err(EngineError::DimMismatch {
                component: Component::Mpc,
                expected: 2,
                got: self.config.t_pred,
            });
        }

        let t_pred = self.config.t_pred;
        let mut x_hist = Vec::with_capacity(t_sim + 1);
        let mut u_hist = Vec::with_capacity(t_sim);
        let mut x_current = x0_real;

        for step in 0..t_sim {
            let window_x = window(x_star, step, t_pred);
            let window_u = window(u_star, step, t_pred - 1);
            let solved = self.solve_horizon(&window_x, &window_u, x_current, step)?;

            x_hist.push(x_current);
            let u_apply = solved.u[0];
            u_hist.push(u_apply);

            let stepped = self.dynamics.step(&x_current, &u_apply)?;
            x_current = stepped.x_next;
        }
        x_hist.push(x_current);

        Ok(MpcResult { x: x_hist, u: u_hist })
    }
}

fn bump(current: f64) -> f64 {
    if current > 0.0 {
        current * PENALTY_GROWTH
    } else {
        PENALTY_INITIAL
    }
}

/// Build a length-`len` window of `series` starting at `start`, holding the
/// last element once the window runs past the end (the nominal trajectory is
/// only defined over the optimization horizon, shorter than `real_step +
/// t_pred` near the tail of an MPC run).
fn window<T: Copy>(series: &[T], start: usize, len: usize) -> Vec<T> {
    (0..len)
        .map(|i| series[(start + i).min(series.len() - 1)])
        .collect()
}
