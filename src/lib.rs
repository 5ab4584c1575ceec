//! Core numerical engine for discrete-time optimal control of a nonlinear
//! bicycle-model vehicle: a fixed-step integrator with analytic Jacobians, a
//! cornering-equilibrium solver that seeds a two-phase reference, a
//! Newton-like trajectory optimizer built on a time-varying affine LQR
//! sub-solver with Armijo backtracking, and two post-optimization
//! controllers — a trajectory-tracking LQR and a box-constrained linear MPC.
//!
//! This is a library-only crate: plotting, animation, CLI glue, and file I/O
//! are a caller's concern. [`config`] holds the plain, `serde`-derivable
//! configuration structs threaded through every component; [`errors`] holds
//! the single [`errors::EngineError`] type every fallible entry point
//! returns.
//!
//! The dynamics plugin contract ([`dynamics::Dynamics`]) is the only coupling
//! surface between the model-specific physics and the rest of the engine:
//! [`dynamics::vehicle::VehicleDynamics`] is the six-state bicycle model this
//! engine targets, [`dynamics::pendulum::PendulumDynamics`] is a two-state
//! alternate plugin used for cheap validation of the optimizer itself.

pub mod affine_lqr;
pub mod config;
pub mod cost;
pub mod dynamics;
pub mod equilibrium;
pub mod errors;
pub mod linear_solver;
pub mod mpc;
pub mod newton;
pub mod smoothing;
pub mod tracking;

pub use affine_lqr::{AffineLqrProblem, AffineLqrSolution};
pub use cost::CostWeights;
pub use dynamics::{Dynamics, StepResult};
pub use equilibrium::{build_reference, solve_equilibrium, Equilibrium};
pub use errors::{Component, EngineError};
pub use mpc::{ConstrainedMpc, MpcResult};
pub use newton::{NewtonOptimizer, NewtonOutcome, NewtonResult};
pub use smoothing::smooth_reference;
pub use tracking::{TrackingLqr, TrackingResult};
