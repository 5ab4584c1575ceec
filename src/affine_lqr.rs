//! Time-varying affine LQR (component C4): the backward Riccati recursion
//! that both the Newton trajectory optimizer and the constrained MPC solver
//! build their per-iteration subproblem on top of.

use nalgebra::{SMatrix, SVector};

use crate::errors::{Component, EngineError};
use crate::linear_solver::{invert_spd, solve_spd};

/// One time-varying affine LQR problem over a horizon of `T` steps, where
/// `T = a_seq.len() == b_seq.len() == q_seq.len() + 1`. Index `t` holds the
/// linearization `(A_t, B_t)` and stage weights `(Q_t, R_t, S_t, q_t, r_t)`
/// for `t in 0..T-1`; the terminal slot holds `(Q_T, q_T)`.
pub struct AffineLqrProblem<const NS: usize, const NI: usize> {
    pub a: Vec<SMatrix<f64, NS, NS>>,
    pub b: Vec<SMatrix<f64, NS, NI>>,
    pub q: Vec<SMatrix<f64, NS, NS>>,
    pub r: Vec<SMatrix<f64, NI, NI>>,
    pub s: Vec<SMatrix<f64, NI, NS>>,
    pub q_affine: Vec<SVector<f64, NS>>,
    pub r_affine: Vec<SVector<f64, NI>>,
    pub q_terminal: SMatrix<f64, NS, NS>,
    pub q_affine_terminal: SVector<f64, NS>,
    pub x0: SVector<f64, NS>,
}

/// Output of a Riccati sweep plus its forward rollout.
pub struct AffineLqrSolution<const NS: usize, const NI: usize> {
    /// State trajectory, length `T`.
    pub x: Vec<SVector<f64, NS>>,
    /// Input trajectory, length `T - 1`.
    pub u: Vec<SVector<f64, NI>>,
    /// Time-varying feedback gains, length `T - 1`.
    pub k: Vec<SMatrix<f64, NI, NS>>,
    /// Feedforward terms, length `T - 1`.
    pub sigma: Vec<SVector<f64, NI>>,
}

impl<const NS: usize, const NI: usize> AffineLqrProblem<NS, NI> {
    fn horizon(&self) -> usize {
        self.a.len()
    }

    /// Solve with all affine (`q_affine`/`r_affine`/`q_affine_terminal`) terms
    /// as given — the shape the Newton optimizer's per-iteration subproblem
    /// needs, since its costate gradients are generally nonzero.
    pub fn solve_affine(&self) -> Result<AffineLqrSolution<NS, NI>, EngineError> {
        solve(self)
    }

    /// Solve with every affine term forced to zero, i.e. a pure quadratic
    /// tracking LQR. Thin wrapper so callers that never have affine terms
    /// (tracking LQR, MPC) don't have to construct zero vectors themselves.
    pub fn solve_pure(
        a: Vec<SMatrix<f64, NS, NS>>,
        b: Vec<SMatrix<f64, NS, NI>>,
        q: Vec<SMatrix<f64, NS, NS>>,
        r: Vec<SMatrix<f64, NI, NI>>,
        q_terminal: SMatrix<f64, NS, NS>,
        x0: SVector<f64, NS>,
    ) -> Result<AffineLqrSolution<NS, NI>, EngineError> {
        let t_minus_1 = a.len();
        let s = vec![SMatrix::<f64, NI, NS>::zeros(); t_minus_1];
        let q_affine = vec![SVector::<f64, NS>::zeros(); t_minus_1];
        let r_affine = vec![SVector::<f64, NI>::zeros(); t_minus_1];
        let problem = AffineLqrProblem {
            a,
            b,
            q,
            r,
            s,
            q_affine,
            r_affine,
            q_terminal,
            q_affine_terminal: SVector::<f64, NS>::zeros(),
            x0,
        };
        solve(&problem)
    }
}

fn solve<const NS: usize, const NI: usize>(
    problem: &AffineLqrProblem<NS, NI>,
) -> Result<AffineLqrSolution<NS, NI>, EngineError> {
    let t_minus_1 = problem.horizon();
    let t_len = t_minus_1 + 1;

    let mut p = vec![SMatrix::<f64, NS, NS>::zeros(); t_len];
    let mut p_affine = vec![SVector::<f64, NS>::zeros(); t_len];
    let mut k = vec![SMatrix::<f64, NI, NS>::zeros(); t_minus_1];
    let mut sigma = vec![SVector::<f64, NI>::zeros(); t_minus_1];

    p[t_minus_1] = problem.q_terminal;
    p_affine[t_minus_1] = problem.q_affine_terminal;

    for t in (0..t_minus_1).rev() {
        let a_t = &problem.a[t];
        let b_t = &problem.b[t];
        let s_t = &problem.s[t];
        let p_next = &p[t + 1];
        let p_affine_next = &p_affine[t + 1];

        let m_t = problem.r[t] + b_t.transpose() * p_next * b_t;
        let m_rhs = problem.r_affine[t] + b_t.transpose() * p_affine_next;
        let cross = b_t.transpose() * p_next * a_t + s_t;

        let m_inv = invert_spd(&m_t, Component::AffineLqr, None, Some(t))?;
        let m_solve = solve_spd(&m_t, &m_rhs, Component::AffineLqr, None, Some(t))?;

        k[t] = -m_inv * cross;
        sigma[t] = -m_solve;

        p[t] = a_t.transpose() * p_next * a_t - cross.transpose() * m_inv * cross + problem.q[t];
        p_affine[t] =
            a_t.transpose() * p_affine_next - cross.transpose() * m_solve + problem.q_affine[t];
    }

    let mut x = vec![SVector::<f64, NS>::zeros(); t_len];
    let mut u = vec![SVector::<f64, NI>::zeros(); t_minus_1];
    x[0] = problem.x0;
    for t in 0..t_minus_1 {
        u[t] = k[t] * x[t] + sigma[t];
        x[t + 1] = problem.a[t] * x[t] + problem.b[t] * u[t];
    }

    Ok(AffineLqrSolution { x, u, k, sigma })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// A 1-D double integrator driven off its origin should be steered back
    /// toward the origin by the feedback law alone (zero affine terms).
    #[test]
    fn pure_lqr_stabilizes_integrator() {
        let t_len = 20;
        let dt = 0.1;
        let a = SMatrix::<f64, 2, 2>::new(1.0, dt, 0.0, 1.0);
        let b = SMatrix::<f64, 2, 1>::new(0.0, dt);
        let q = SMatrix::<f64, 2, 2>::identity();
        let r = SMatrix::<f64, 1, 1>::new(0.1);
        let q_terminal = SMatrix::<f64, 2, 2>::identity() * 10.0;
        let x0 = SVector::<f64, 2>::new(1.0, 0.0);

        let solution = AffineLqrProblem::solve_pure(
            vec![a; t_len - 1],
            vec![b; t_len - 1],
            vec![q; t_len - 1],
            vec![r; t_len - 1],
            q_terminal,
            x0,
        )
        .unwrap();

        assert!(solution.x.last().unwrap().norm() < solution.x[0].norm());
    }

    #[test]
    fn affine_terms_shift_the_fixed_point() {
        let t_len = 10;
        let a = SMatrix::<f64, 1, 1>::new(1.0);
        let b = SMatrix::<f64, 1, 1>::new(1.0);
        let q = SMatrix::<f64, 1, 1>::new(1.0);
        let r = SMatrix::<f64, 1, 1>::new(1.0);
        let problem = AffineLqrProblem {
            a: vec![a; t_len - 1],
            b: vec![b; t_len - 1],
            q: vec![q; t_len - 1],
            r: vec![r; t_len - 1],
            s: vec![SMatrix::<f64, 1, 1>::zeros(); t_len - 1],
            q_affine: vec![SVector::<f64, 1>::new(-1.0); t_len - 1],
            r_affine: vec![SVector::<f64, 1>::zeros(); t_len - 1],
            q_terminal: q,
            q_affine_terminal: SVector::<f64, 1>::new(-1.0),
            x0: SVector::<f64, 1>::zeros(),
        };
        let solution = problem.solve_affine().unwrap();
        assert_relative_eq!(solution.u[0][0], solution.u.last().unwrap()[0], epsilon = 1e-2);
    }
}
