//! SPD solve used by the Riccati pivot in [`crate::affine_lqr`].
//!
//! A generic `Solver`/`Matrix` trait hierarchy over arbitrary-size system
//! matrices (LU, GMRES, ...) is overkill here: every solve in this engine is
//! a small, fixed-size, symmetric positive-definite pivot, so a direct
//! Cholesky factorization via `nalgebra`'s const-generic types is both
//! simpler and faster than routing through a trait object.

use nalgebra::{SMatrix, SVector};

use crate::errors::{Component, EngineError};

/// Solve `M x = b` for symmetric positive-definite `M` via Cholesky.
/// Returns [`EngineError::IllConditioned`] if `M` is not numerically SPD.
pub fn solve_spd<const N: usize>(
    m: &SMatrix<f64, N, N>,
    b: &SVector<f64, N>,
    component: Component,
    iteration: Option<usize>,
    time_step: Option<usize>,
) -> Result<SVector<f64, N>, EngineError> {
    m.cholesky()
        .map(|chol| chol.solve(b))
        .ok_or(EngineError::IllConditioned {
            component,
            iteration,
            time_step,
        })
}

/// Invert a symmetric positive-definite matrix via Cholesky, for pivots that
/// need the explicit inverse rather than a single solve (e.g. the gain
/// `K_t = -M_t^{-1} N_t`).
pub fn invert_spd<const N: usize>(
    m: &SMatrix<f64, N, N>,
    component: Component,
    iteration: Option<usize>,
    time_step: Option<usize>,
) -> Result<SMatrix<f64, N, N>, EngineError> {
    m.cholesky()
        .map(|chol| chol.inverse())
        .ok_or(EngineError::IllConditioned {
            component,
            iteration,
            time_step,
        })
}
