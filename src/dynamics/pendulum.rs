use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};

use super::{check_finite, Dynamics, StepResult};
use crate::errors::{Component, EngineError};

/// State layout `x = (theta, theta_dot)`.
pub const NS: usize = 2;
/// Input layout `u = (torque,)`.
pub const NI: usize = 1;

/// Damped single-link pendulum, used as the cheap low-order validation model
/// for the optimizer before it is run against the full vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendulumParams {
    pub mass: f64,
    pub length: f64,
    pub inertia: f64,
    pub damping: f64,
    pub g: f64,
    pub dt: f64,
}

impl Default for PendulumParams {
    fn default() -> Self {
        Self {
            mass: 1.0,
            length: 1.0,
            inertia: 1.0,
            damping: 0.1,
            g: 9.81,
            dt: 1e-3,
        }
    }
}

impl PendulumParams {
    /// Equilibrium torque constant: `u_eq = KKeq·sin(theta_eq)` when `theta_dot = 0`.
    pub fn k_eq(&self) -> f64 {
        self.mass * self.g * self.length / self.inertia
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendulumDynamics {
    pub params: PendulumParams,
}

impl PendulumDynamics {
    pub fn new(params: PendulumParams) -> Self {
        Self { params }
    }
}

impl Dynamics<NS, NI> for PendulumDynamics {
    fn step(
        &self,
        x: &SVector<f64, NS>,
        u: &SVector<f64, NI>,
    ) -> Result<StepResult<NS, NI>, EngineError> {
        let p = &self.params;
        let (theta, theta_dot) = (x[0], x[1]);
        let torque = u[0];

        let (s_theta, c_theta) = theta.sin_cos();
        let theta_ddot =
            (torque - p.mass * p.g * p.length * s_theta - p.damping * theta_dot) / p.inertia;

        let x_dot = SVector::<f64, NS>::from_column_slice(&[theta_dot, theta_ddot]);
        let x_next = x + p.dt * x_dot;
        check_finite(&x_next, Component::Dynamics)?;

        let jc_x = SMatrix::<f64, NS, NS>::new(
            0.0,
            1.0,
            -p.mass * p.g * p.length * c_theta / p.inertia,
            -p.damping / p.inertia,
        );
        let jc_u = SMatrix::<f64, NS, NI>::new(0.0, 1.0 / p.inertia);

        let identity = SMatrix::<f64, NS, NS>::identity();
        let a = identity + p.dt * jc_x;
        let b = p.dt * jc_u;

        Ok(StepResult { x_next, a, b })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> PendulumDynamics {
        PendulumDynamics::new(PendulumParams::default())
    }

    #[test]
    fn equilibrium_torque_holds_state_still() {
        let dyn_model = model();
        let theta_eq: f64 = 0.4;
        let u_eq = dyn_model.params.k_eq() * theta_eq.sin();
        let x = SVector::<f64, NS>::from_column_slice(&[theta_eq, 0.0]);
        let u = SVector::<f64, NI>::from_column_slice(&[u_eq]);
        let result = dyn_model.step(&x, &u).unwrap();
        assert_relative_eq!(result.x_next[0], theta_eq, epsilon = 1e-9);
        assert_relative_eq!(result.x_next[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn jacobian_matches_finite_difference() {
        let dyn_model = model();
        let x = SVector::<f64, NS>::from_column_slice(&[0.2, -0.1]);
        let u = SVector::<f64, NI>::from_column_slice(&[0.5]);
        let result = dyn_model.step(&x, &u).unwrap();

        let eps = 1e-6;
        for j in 0..NS {
            let mut dx = SVector::<f64, NS>::zeros();
            dx[j] = eps;
            let perturbed = dyn_model.step(&(x + dx), &u).unwrap();
            let finite_diff = (perturbed.x_next - result.x_next) / eps;
            let analytic = result.a.column(j);
            for i in 0..NS {
                assert_relative_eq!(finite_diff[i], analytic[i], epsilon = 1e-6, max_relative = 1e-3);
            }
        }

        let mut du = SVector::<f64, NI>::zeros();
        du[0] = eps;
        let perturbed = dyn_model.step(&x, &(u + du)).unwrap();
        let finite_diff = (perturbed.x_next - result.x_next) / eps;
        let analytic = result.b.column(0);
        for i in 0..NS {
            assert_relative_eq!(finite_diff[i], analytic[i], epsilon = 1e-6, max_relative = 1e-3);
        }
    }
}
