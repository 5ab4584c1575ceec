//! Quadratic tracking cost (component C2): stage and terminal cost, each
//! returning its value alongside the gradients and Hessians the Newton
//! optimizer and the LQR solvers need.

use nalgebra::{SMatrix, SVector};

/// Weights for a quadratic-in-deviation tracking cost. `q`/`q_terminal` weight
/// state deviation from the reference, `r` weights input deviation, `s`
/// the state/input cross term (zero for every scenario this engine runs, but
/// carried because the affine LQR primitive is generic over it).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostWeights<const NS: usize, const NI: usize> {
    pub q: SMatrix<f64, NS, NS>,
    pub r: SMatrix<f64, NI, NI>,
    pub s: SMatrix<f64, NI, NS>,
    pub q_terminal: SMatrix<f64, NS, NS>,
}

impl<const NS: usize, const NI: usize> CostWeights<NS, NI> {
    /// Construct weights with zero cross term, the shape every scenario in
    /// this engine actually uses.
    pub fn diagonal_tracking(q: SMatrix<f64, NS, NS>, r: SMatrix<f64, NI, NI>) -> Self {
        Self {
            q,
            r,
            s: SMatrix::<f64, NI, NS>::zeros(),
            q_terminal: q,
        }
    }
}

/// Value, gradient, and Hessian blocks of a stage or terminal cost evaluated
/// at one `(x, u)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostDerivatives<const NS: usize, const NI: usize> {
    pub value: f64,
    pub lx: SVector<f64, NS>,
    pub lu: SVector<f64, NI>,
    pub lxx: SMatrix<f64, NS, NS>,
    pub luu: SMatrix<f64, NI, NI>,
    pub lux: SMatrix<f64, NI, NS>,
}

/// `0.5 (x - x_ref)ᵀQ(x - x_ref) + 0.5 (u - u_ref)ᵀR(u - u_ref)`.
pub fn stage_cost<const NS: usize, const NI: usize>(
    weights: &CostWeights<NS, NI>,
    x: &SVector<f64, NS>,
    u: &SVector<f64, NI>,
    x_ref: &SVector<f64, NS>,
    u_ref: &SVector<f64, NI>,
) -> CostDerivatives<NS, NI> {
    let dx = x - x_ref;
    let du = u - u_ref;
    let value = 0.5 * (dx.transpose() * weights.q * dx)[(0, 0)]
        + 0.5 * (du.transpose() * weights.r * du)[(0, 0)];
    CostDerivatives {
        value,
        lx: weights.q * dx,
        lu: weights.r * du,
        lxx: weights.q,
        luu: weights.r,
        lux: weights.s,
    }
}

/// `0.5 (x - x_ref)ᵀQ_T(x - x_ref)`, no input term.
pub fn terminal_cost<const NS: usize, const NI: usize>(
    weights: &CostWeights<NS, NI>,
    x: &SVector<f64, NS>,
    x_ref: &SVector<f64, NS>,
) -> (f64, SVector<f64, NS>, SMatrix<f64, NS, NS>) {
    let dx = x - x_ref;
    let value = 0.5 * (dx.transpose() * weights.q_terminal * dx)[(0, 0)];
    (value, weights.q_terminal * dx, weights.q_terminal)
}

/// Vehicle weights `Q = 0.1·diag(1,1,1000,10000,1000,1000)`, `R = 0.1·diag(1000,0.0001)`.
pub fn vehicle_weights() -> CostWeights<6, 2> {
    let q = SMatrix::<f64, 6, 6>::from_diagonal(&SVector::<f64, 6>::from_column_slice(&[
        1.0, 1.0, 1000.0, 10000.0, 1000.0, 1000.0,
    ])) * 0.1;
    let r =
        SMatrix::<f64, 2, 2>::from_diagonal(&SVector::<f64, 2>::from_column_slice(&[1000.0, 0.0001]))
            * 0.1;
    CostWeights::diagonal_tracking(q, r)
}

/// Pendulum weights `Q = 0.1·diag(100,1)`, `R = 0.01`.
pub fn pendulum_weights() -> CostWeights<2, 1> {
    let q = SMatrix::<f64, 2, 2>::from_diagonal(&SVector::<f64, 2>::from_column_slice(&[
        100.0, 1.0,
    ])) * 0.1;
    let r = SMatrix::<f64, 1, 1>::new(0.01);
    CostWeights::diagonal_tracking(q, r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn stage_cost_is_zero_at_reference() {
        let weights = vehicle_weights();
        let x = SVector::<f64, 6>::from_column_slice(&[1.0, 2.0, 0.1, 10.0, 0.01, 0.02]);
        let u = SVector::<f64, 2>::from_column_slice(&[0.05, 100.0]);
        let d = stage_cost(&weights, &x, &u, &x, &u);
        assert_relative_eq!(d.value, 0.0, epsilon = 1e-12);
        assert_relative_eq!(d.lx.norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(d.lu.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let weights = vehicle_weights();
        let x = SVector::<f64, 6>::from_column_slice(&[0.2, -0.1, 0.05, 8.0, 0.02, -0.01]);
        let u = SVector::<f64, 2>::from_column_slice(&[0.01, 50.0]);
        let x_ref = SVector::<f64, 6>::zeros();
        let u_ref = SVector::<f64, 2>::zeros();
        let d = stage_cost(&weights, &x, &u, &x_ref, &u_ref);

        let eps = 1e-6;
        for i in 0..6 {
            let mut dx = SVector::<f64, 6>::zeros();
            dx[i] = eps;
            let plus = stage_cost(&weights, &(x + dx), &u, &x_ref, &u_ref).value;
            let minus = stage_cost(&weights, &(x - dx), &u, &x_ref, &u_ref).value;
            let fd = (plus - minus) / (2.0 * eps);
            assert_relative_eq!(fd, d.lx[i], epsilon = 1e-5, max_relative = 1e-3);
        }
    }
}
