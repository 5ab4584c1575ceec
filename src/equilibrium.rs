//! Cornering-equilibrium solver and two-phase reference builder (component
//! C3). Given a target speed/sideslip pair `(V, beta)`, finds the yaw rate,
//! steering angle, and drive force `(r, delta, F)` that make `Vdot = betadot
//! = rdot = 0`, then stitches two such equilibria into a step reference the
//! way the reference trajectory generator does: positions and heading are
//! rolled forward through the real dynamics, the dynamic channels are pinned
//! to whichever equilibrium is active.

use nalgebra::{SMatrix, SVector};

use crate::config::{EquilibriumConfig, HorizonConfig};
use crate::dynamics::vehicle::{VehicleDynamics, VehicleParams};
use crate::dynamics::Dynamics;
use crate::errors::{Component, EngineError};

/// A cornering equilibrium: constant `(V, beta, r)` sustained by constant
/// `(delta, F)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Equilibrium {
    pub v: f64,
    pub beta: f64,
    pub r: f64,
    pub delta: f64,
    pub f: f64,
}

fn residual(params: &VehicleParams, v: f64, beta: f64, vars: &SVector<f64, 3>) -> SVector<f64, 3> {
    let (r, delta, f) = (vars[0], vars[1], vars[2]);
    let (sb, cb) = beta.sin_cos();
    let g1 = beta - delta;
    let (sg1, cg1) = g1.sin_cos();
    let (sd, cd) = delta.sin_cos();

    let fzf = params.mass * params.g * params.b / (params.a + params.b);
    let fzr = params.mass * params.g * params.a / (params.a + params.b);

    let beta_f = delta - (v * sb + params.a * r) / (v * cb);
    let beta_r = -(v * sb - params.b * r) / (v * cb);
    let fyf = params.mu * fzf * beta_f;
    let fyr = params.mu * fzr * beta_r;

    let v_dot = (fyr * sb + f * cg1 + fyf * sg1) / params.mass;
    let beta_dot = (fyr * cb + fyf * cg1 - f * sg1) / (params.mass * v) - r;
    let r_dot = ((f * sd + fyf * cd) * params.a - fyr * params.b) / params.yaw_inertia;

    SVector::<f64, 3>::new(v_dot, beta_dot, r_dot)
}

fn central_difference_jacobian(
    params: &VehicleParams,
    v: f64,
    beta: f64,
    vars: &SVector<f64, 3>,
) -> SMatrix<f64, 3, 3> {
    let eps = 1e-6;
    let mut jac = SMatrix::<f64, 3, 3>::zeros();
    for j in 0..3 {
        let mut plus = *vars;
        let mut minus = *vars;
        plus[j] += eps;
        minus[j] -= eps;
        let column = (residual(params, v, beta, &plus) - residual(params, v, beta, &minus))
            / (2.0 * eps);
        jac.set_column(j, &column);
    }
    jac
}

/// Damped Newton search for `(r, delta, F)` holding `(V, beta)` fixed.
/// `initial_guess` is `(r_0, delta_0, F_0)`.
pub fn solve_equilibrium(
    params: &VehicleParams,
    v: f64,
    beta: f64,
    initial_guess: SVector<f64, 3>,
    config: &EquilibriumConfig,
) -> Result<Equilibrium, EngineError> {
    let mut vars = initial_guess;
    let mut res = residual(params, v, beta, &vars);

    for _ in 0..config.max_iters {
        if res.norm() < config.residual_tol {
            return Ok(Equilibrium {
                v,
                beta,
                r: vars[0],
                delta: vars[1],
                f: vars[2],
            });
        }

        let jac = central_difference_jacobian(params, v, beta, &vars);
        let step = jac
            .lu()
            .solve(&res)
            .ok_or(EngineError::IllConditioned {
                component: Component::Equilibrium,
                iteration: None,
                time_step: None,
            })?;

        // Damped Newton: halve the step until the residual actually shrinks.
        let mut damping = 1.0;
        loop {
            let trial = vars - damping * step;
            let trial_res = residual(params, v, beta, &trial);
            if trial_res.norm() < res.norm() || damping < 1e-4 {
                vars = trial;
                res = trial_res;
                break;
            }
            damping *= 0.5;
        }
    }

    if res.norm() < config.residual_tol {
        Ok(Equilibrium {
            v,
            beta,
            r: vars[0],
            delta: vars[1],
            f: vars[2],
        })
    } else {
        Err(EngineError::NoEquilibrium {
            max_iters: config.max_iters,
            residual_norm: res.norm(),
        })
    }
}

impl Equilibrium {
    fn state(&self, px: f64, py: f64, psi: f64) -> SVector<f64, 6> {
        SVector::<f64, 6>::from_column_slice(&[px, py, psi, self.v, self.beta, self.r])
    }

    fn input(&self) -> SVector<f64, 2> {
        SVector::<f64, 2>::new(self.delta, self.f)
    }
}

/// Two-phase step reference: `eq_first` holds for `t < t_mid`, `eq_second`
/// for `t >= t_mid`. Positions and heading are rolled forward through the
/// real dynamics each step so `psi` accumulates across the switch rather than
/// resetting — the reference never stops turning when the equilibrium
/// changes. `u_ref` has length `T - 1` (it is never evaluated past the last
/// transition it drives), matching the `u.len() + 1 == x.len()` contract
/// every consumer (`NewtonOptimizer::solve`, `TrackingLqr::track`,
/// `ConstrainedMpc::run`) enforces.
pub fn build_reference(
    dynamics: &VehicleDynamics,
    horizon: &HorizonConfig,
    eq_first: &Equilibrium,
    eq_second: &Equilibrium,
) -> Result<(Vec<SVector<f64, 6>>, Vec<SVector<f64, 2>>), EngineError> {
    let mut x_ref = Vec::with_capacity(horizon.t_horizon);
    let mut u_ref = Vec::with_capacity(horizon.t_horizon.saturating_sub(1));

    x_ref.push(eq_first.state(0.0, 0.0, 0.0));

    for t in 1..horizon.t_horizon {
        let active = if t < horizon.t_mid { eq_first } else { eq_second };
        let prev_active = if t - 1 < horizon.t_mid { eq_first } else { eq_second };
        let u_prev = prev_active.input();
        u_ref.push(u_prev);

        let stepped = dynamics.step(&x_ref[t - 1], &u_prev)?;
        let next = active.state(stepped.x_next[0], stepped.x_next[1], stepped.x_next[2]);
        x_ref.push(next);
    }

    Ok((x_ref, u_ref))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn solved_equilibrium_has_near_zero_residual() {
        let params = VehicleParams::default();
        let config = EquilibriumConfig::default();
        let guess = SVector::<f64, 3>::new(0.1, 0.1, 5.0);
        let eq = solve_equilibrium(&params, 3.0, 0.02, guess, &config).unwrap();
        let res = residual(&params, eq.v, eq.beta, &SVector::<f64, 3>::new(eq.r, eq.delta, eq.f));
        assert_relative_eq!(res.norm(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn reference_psi_accumulates_across_the_switch() {
        let params = VehicleParams::default();
        let config = EquilibriumConfig::default();
        let guess = SVector::<f64, 3>::new(0.1, 0.1, 5.0);
        let eq1 = solve_equilibrium(&params, 3.0, 0.02, guess, &config).unwrap();
        let eq2 = solve_equilibrium(&params, 5.0, 0.07, guess, &config).unwrap();
        let horizon = HorizonConfig::new(params.dt, 40);
        let dynamics = VehicleDynamics::new(params);
        let (x_ref, _) = build_reference(&dynamics, &horizon, &eq1, &eq2).unwrap();

        let psi_at_mid = x_ref[horizon.t_mid][2];
        let psi_after = x_ref[horizon.t_mid + 5][2];
        assert!(psi_after > psi_at_mid, "psi must keep accumulating after the switch");
    }
}
