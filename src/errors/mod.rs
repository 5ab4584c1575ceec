use thiserror::Error;

/// Which component raised an [`EngineError`], for diagnostics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Dynamics,
    Cost,
    Equilibrium,
    AffineLqr,
    Newton,
    TrackingLqr,
    Mpc,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Component::Dynamics => "dynamics",
            Component::Cost => "cost",
            Component::Equilibrium => "equilibrium",
            Component::AffineLqr => "affine_lqr",
            Component::Newton => "newton",
            Component::TrackingLqr => "tracking_lqr",
            Component::Mpc => "mpc",
        };
        f.write_str(name)
    }
}

/// Errors produced by the engine. Every variant is returned as a value, never
/// panicked or thrown out-of-band, and carries the component that raised it
/// plus (where meaningful) the iteration index at which it happened.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("{component}: non-finite value produced at iteration {iteration:?}")]
    NumericOverflow {
        component: Component,
        iteration: Option<usize>,
    },

    #[error("{component}: ill-conditioned pivot at iteration {iteration:?} (time step {time_step:?})")]
    IllConditioned {
        component: Component,
        iteration: Option<usize>,
        time_step: Option<usize>,
    },

    #[error("equilibrium solver did not converge to residual < 1e-8 within {max_iters} iterations (final residual {residual_norm:e})")]
    NoEquilibrium {
        max_iters: usize,
        residual_norm: f64,
    },

    #[error("newton: Armijo line search exhausted {trials} trials at iteration {iteration} without a sufficient-decrease step")]
    LinesearchFail { iteration: usize, trials: usize },

    #[error("mpc: QP infeasible at real-time step {time_step}")]
    MpcInfeasible { time_step: usize },

    #[error("{component}: dimension mismatch: expected {expected}, got {got}")]
    DimMismatch {
        component: Component,
        expected: usize,
        got: usize,
    },
}

impl EngineError {
    pub fn component(&self) -> Component {
        match self {
            EngineError::NumericOverflow { component, .. } => *component,
            EngineError::IllConditioned { component, .. } => *component,
            EngineError::NoEquilibrium { .. } => Component::Equilibrium,
            EngineError::LinesearchFail { .. } => Component::Newton,
            EngineError::MpcInfeasible { .. } => Component::Mpc,
            EngineError::DimMismatch { component, .. } => *component,
        }
    }
}
