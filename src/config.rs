//! Plain configuration structs threaded through the engine. The engine
//! performs no file I/O itself — loading these from TOML/JSON is a caller
//! concern — but they derive `serde::{Serialize, Deserialize}` because that is
//! the ambient convention for config types throughout this corpus.

use serde::{Deserialize, Serialize};

/// Time horizon shared by every component that walks a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizonConfig {
    /// Sample time `Δt`, seconds.
    pub dt: f64,
    /// Number of discrete samples `T ≥ 2`.
    pub t_horizon: usize,
    /// Index at which the two-phase reference switches equilibria.
    pub t_mid: usize,
}

impl HorizonConfig {
    pub fn new(dt: f64, t_horizon: usize) -> Self {
        Self {
            dt,
            t_horizon,
            t_mid: t_horizon / 2,
        }
    }

    pub fn final_time(&self) -> f64 {
        self.dt * self.t_horizon as f64
    }
}

/// Armijo backtracking line-search parameters for [`crate::newton::NewtonOptimizer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmijoConfig {
    /// Sufficient-decrease constant `c`.
    pub c: f64,
    /// Backtracking factor `β`.
    pub beta: f64,
    /// Initial step size `γ_0`.
    pub gamma_0: f64,
    /// Maximum number of backtracking trials before `LINESEARCH_FAIL`.
    pub max_iters: usize,
}

impl Default for ArmijoConfig {
    fn default() -> Self {
        Self {
            c: 0.5,
            beta: 0.7,
            gamma_0: 1.0,
            max_iters: 20,
        }
    }
}

/// Newton outer-loop convergence parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewtonConfig {
    pub k_max: usize,
    /// Terminate when the descent magnitude `d^k` falls at or below this.
    pub term_tol: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            k_max: 15,
            term_tol: 1e-6,
        }
    }
}

/// Box-constraint bounds and prediction horizon for [`crate::mpc::ConstrainedMpc`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MpcConfig {
    pub t_pred: usize,
    pub u_min: f64,
    pub u_max: f64,
    pub x_max: f64,
    /// Input channel index the bounds apply to (braking/drive force: index 1).
    pub u_index: usize,
    /// State channel index the upper bound applies to (side-slip angle: index 4).
    pub x_index: usize,
    /// Outer active-set iterations before `MPC_INFEASIBLE`.
    pub max_active_set_iters: usize,
}

impl Default for MpcConfig {
    fn default() -> Self {
        Self {
            t_pred: 100,
            u_min: 0.0,
            u_max: 600.0,
            x_max: 0.15,
            u_index: 1,
            x_index: 4,
            max_active_set_iters: 20,
        }
    }
}

/// Equilibrium solver convergence parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumConfig {
    pub max_iters: usize,
    pub residual_tol: f64,
}

impl Default for EquilibriumConfig {
    fn default() -> Self {
        Self {
            max_iters: 200,
            residual_tol: 1e-8,
        }
    }
}
