use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};

use super::{check_finite, Dynamics, StepResult};
use crate::errors::{Component, EngineError};

/// State layout `x = (p_x, p_y, psi, V, beta, r)`.
pub const NS: usize = 6;
/// Input layout `u = (delta, F)`.
pub const NI: usize = 2;

/// Physical constants for the bicycle model. Defaults are taken from the
/// reference implementation this engine was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleParams {
    /// Mass, kg.
    pub mass: f64,
    /// Yaw inertia, kg·m².
    pub yaw_inertia: f64,
    /// Front axle distance, m.
    pub a: f64,
    /// Rear axle distance, m.
    pub b: f64,
    /// Friction coefficient (nondimensional).
    pub mu: f64,
    /// Gravity, m/s².
    pub g: f64,
    /// Integration step, s.
    pub dt: f64,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            mass: 1480.0,
            yaw_inertia: 1950.0,
            a: 1.421,
            b: 1.029,
            mu: 1.0,
            g: 9.81,
            dt: 1e-3,
        }
    }
}

/// Forward-Euler discretized nonlinear bicycle model with analytic Jacobians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleDynamics {
    pub params: VehicleParams,
}

impl VehicleDynamics {
    pub fn new(params: VehicleParams) -> Self {
        Self { params }
    }

    /// Vertical loads `(F_z,front, F_z,rear)`, constant given the geometry.
    fn vertical_loads(&self) -> (f64, f64) {
        let p = &self.params;
        let fzf = p.mass * p.g * p.b / (p.a + p.b);
        let fzr = p.mass * p.g * p.a / (p.a + p.b);
        (fzf, fzr)
    }
}

impl Dynamics<NS, NI> for VehicleDynamics {
    fn step(
        &self,
        x: &SVector<f64, NS>,
        u: &SVector<f64, NI>,
    ) -> Result<StepResult<NS, NI>, EngineError> {
        let p = &self.params;
        let (psi, v, beta, r) = (x[2], x[3], x[4], x[5]);
        let (delta, f) = (u[0], u[1]);

        let (sb, cb) = beta.sin_cos();
        let bp = beta + psi;
        let (sbp, cbp) = bp.sin_cos();
        let g1 = beta - delta;
        let (sg1, cg1) = g1.sin_cos();
        let (sd, cd) = delta.sin_cos();
        let cb2 = cb * cb;

        if (v * cb).abs() < 1e-12 {
            return Err(EngineError::NumericOverflow {
                component: Component::Dynamics,
                iteration: None,
            });
        }

        let (fzf, fzr) = self.vertical_loads();

        let beta_f = delta - (v * sb + p.a * r) / (v * cb);
        let beta_r = -(v * sb - p.b * r) / (v * cb);
        let fyf = p.mu * fzf * beta_f;
        let fyr = p.mu * fzr * beta_r;

        let px_dot = v * cbp;
        let py_dot = v * sbp;
        let psi_dot = r;
        let v_dot = (fyr * sb + f * cg1 + fyf * sg1) / p.mass;
        let beta_dot = (fyr * cb + fyf * cg1 - f * sg1) / (p.mass * v) - r;
        let r_dot = ((f * sd + fyf * cd) * p.a - fyr * p.b) / p.yaw_inertia;

        let x_dot = SVector::<f64, NS>::from_column_slice(&[
            px_dot, py_dot, psi_dot, v_dot, beta_dot, r_dot,
        ]);
        let x_next = x + p.dt * x_dot;
        check_finite(&x_next, Component::Dynamics)?;

        // --- analytic continuous Jacobians, see DESIGN.md for the derivation ---
        let w = 1.0 / (v * cb);
        let dw_dv = -w / v;
        let dw_dbeta = sb / (v * cb2);

        let dbetaf_dv = p.a * r * w / v;
        let dbetaf_dbeta = -1.0 / cb2 - p.a * r * dw_dbeta;
        let dbetaf_dr = -p.a * w;
        let dbetaf_ddelta = 1.0;

        let dbetar_dv = -p.b * r * w / v;
        let dbetar_dbeta = -1.0 / cb2 + p.b * r * dw_dbeta;
        let dbetar_dr = p.b * w;
        let dbetar_ddelta = 0.0;

        let dfyf_dv = p.mu * fzf * dbetaf_dv;
        let dfyf_dbeta = p.mu * fzf * dbetaf_dbeta;
        let dfyf_dr = p.mu * fzf * dbetaf_dr;
        let dfyf_ddelta = p.mu * fzf * dbetaf_ddelta;

        let dfyr_dv = p.mu * fzr * dbetar_dv;
        let dfyr_dbeta = p.mu * fzr * dbetar_dbeta;
        let dfyr_dr = p.mu * fzr * dbetar_dr;
        let dfyr_ddelta = p.mu * fzr * dbetar_ddelta;

        let dvdot_dbeta = (dfyr_dbeta * sb + fyr * cb - f * sg1 + dfyf_dbeta * sg1 + fyf * cg1)
            / p.mass;
        let dvdot_dv = (dfyr_dv * sb + dfyf_dv * sg1) / p.mass;
        let dvdot_dr = (dfyr_dr * sb + dfyf_dr * sg1) / p.mass;
        let dvdot_ddelta = (f * sg1 + dfyf_ddelta * sg1 - fyf * cg1) / p.mass;
        let dvdot_df = cg1 / p.mass;

        let n = fyr * cb + fyf * cg1 - f * sg1;
        let dn_dbeta = dfyr_dbeta * cb - fyr * sb + dfyf_dbeta * cg1 - fyf * sg1 - f * cg1;
        let dn_dv = dfyr_dv * cb + dfyf_dv * cg1;
        let dn_dr = dfyr_dr * cb + dfyf_dr * cg1;
        let dn_ddelta = dfyr_ddelta * cb + dfyf_ddelta * cg1 + fyf * sg1 + f * cg1;
        let dn_df = -sg1;

        let mv = p.mass * v;
        let dbetadot_dbeta = dn_dbeta / mv;
        let dbetadot_dv = (dn_dv * v - n) / (mv * v);
        let dbetadot_dr = dn_dr / mv - 1.0;
        let dbetadot_ddelta = dn_ddelta / mv;
        let dbetadot_df = dn_df / mv;

        let drdot_dbeta = (dfyf_dbeta * cd * p.a - dfyr_dbeta * p.b) / p.yaw_inertia;
        let drdot_dv = (dfyf_dv * cd * p.a - dfyr_dv * p.b) / p.yaw_inertia;
        let drdot_dr = (dfyf_dr * cd * p.a - dfyr_dr * p.b) / p.yaw_inertia;
        let drdot_ddelta =
            (p.a * (f * cd + dfyf_ddelta * cd - fyf * sd) - dfyr_ddelta * p.b) / p.yaw_inertia;
        let drdot_df = p.a * sd / p.yaw_inertia;

        let dpxdot_dpsi = -v * sbp;
        let dpxdot_dv = cbp;
        let dpxdot_dbeta = -v * sbp;
        let dpydot_dpsi = v * cbp;
        let dpydot_dv = sbp;
        let dpydot_dbeta = v * cbp;

        #[rustfmt::skip]
        let jc_x = SMatrix::<f64, NS, NS>::new(
            0.0, 0.0, dpxdot_dpsi, dpxdot_dv,      dpxdot_dbeta,   0.0,
            0.0, 0.0, dpydot_dpsi, dpydot_dv,      dpydot_dbeta,   0.0,
            0.0, 0.0, 0.0,         0.0,            0.0,            1.0,
            0.0, 0.0, 0.0,         dvdot_dv,       dvdot_dbeta,    dvdot_dr,
            0.0, 0.0, 0.0,         dbetadot_dv,    dbetadot_dbeta, dbetadot_dr,
            0.0, 0.0, 0.0,         drdot_dv,       drdot_dbeta,    drdot_dr,
        );
        #[rustfmt::skip]
        let jc_u = SMatrix::<f64, NS, NI>::new(
            0.0, 0.0,
            0.0, 0.0,
            0.0, 0.0,
            dvdot_ddelta,    dvdot_df,
            dbetadot_ddelta, dbetadot_df,
            drdot_ddelta,    drdot_df,
        );

        let identity = SMatrix::<f64, NS, NS>::identity();
        let a = identity + p.dt * jc_x;
        let b = p.dt * jc_u;

        Ok(StepResult { x_next, a, b })
    }
}
