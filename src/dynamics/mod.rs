//! The dynamics plugin contract (component C1) and its two implementors.
//!
//! `n_s`/`n_i` are known at compile time for each plugin, so instead of the
//! dynamic dispatch a single `Dynamics` trait object would require, every
//! plugin is a concrete struct parameterized over the `NS`/`NI` const
//! generics it declares in its `Dynamics<NS, NI>` impl. Downstream code that
//! is itself generic over `D: Dynamics<NS, NI>` monomorphizes per plugin, so
//! the small fixed-size matrices inline the way the design notes call for.

pub mod pendulum;
pub mod vehicle;

pub use pendulum::{PendulumDynamics, PendulumParams};
pub use vehicle::{VehicleDynamics, VehicleParams};

use nalgebra::{SMatrix, SVector};

use crate::errors::{Component, EngineError};

/// Result of one dynamics step: the next state and the Jacobians of the
/// discrete map `x_{t+1} = f(x_t, u_t)` evaluated at `(x_t, u_t)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResult<const NS: usize, const NI: usize> {
    pub x_next: SVector<f64, NS>,
    /// `A = ∂f/∂x`, the Jacobian of the *discrete* map (identity plus `Δt`
    /// times the continuous Jacobian for forward-Euler discretization).
    pub a: SMatrix<f64, NS, NS>,
    /// `B = ∂f/∂u` of the discrete map.
    pub b: SMatrix<f64, NS, NI>,
}

/// A pluggable dynamics model: pure, deterministic, and total on finite
/// inputs. Implementors must supply closed-form Jacobians, not finite
/// differences — see `jacobian_matches_finite_difference` tests in
/// [`vehicle`]/[`pendulum`] for the mandated self-test.
pub trait Dynamics<const NS: usize, const NI: usize> {
    /// Evaluate `x_{t+1} = f(x_t, u_t)` and its Jacobians. Fails with
    /// [`EngineError::NumericOverflow`] only if a non-finite value would be
    /// produced (e.g. division by zero when `V·cos β = 0`).
    fn step(
        &self,
        x: &SVector<f64, NS>,
        u: &SVector<f64, NI>,
    ) -> Result<StepResult<NS, NI>, EngineError>;
}

pub(crate) fn check_finite<const NS: usize>(
    x: &SVector<f64, NS>,
    component: Component,
) -> Result<(), EngineError> {
    if x.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(EngineError::NumericOverflow {
            component,
            iteration: None,
        })
    }
}
