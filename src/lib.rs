#![doc = include_str!("../README.md")]

mod jacobian;
mod linalg;
mod solver;
mod workspace;

pub use linalg::{
    DenseCholesky, DenseLu, LinearSolver, SingularSystem, correlation, covariance, stddev,
};
pub use solver::{
    Diagnostics, IterationStats, Options, Solution, StopReason, solve_analytic,
    solve_analytic_with, solve_secant, solve_secant_with,
};
pub use workspace::Workspace;

use num_traits::Float;

/// A nonlinear least-squares problem: a model function `f : R^m -> R^n`
/// with `n >= m`, evaluated against an optional measurement vector held by
/// the solver.
///
/// Implementations write the model output `f(p)` into `out`; the solver
/// forms the residual `x - f(p)` itself (a missing measurement vector is
/// treated as zero).
pub trait Model {
    /// Scalar type the model computes in.
    type Real: Float;

    /// Number of free parameters, `m`.
    fn params(&self) -> usize;

    /// Number of model outputs / measurements, `n`.
    fn observations(&self) -> usize;

    /// Evaluate the model at `p`, writing `f(p)` into `out` (length `n`).
    fn eval(&self, p: &[Self::Real], out: &mut [Self::Real]);
}

/// A [`Model`] that can also evaluate its Jacobian analytically.
///
/// Models without this capability are solved with [`solve_secant`], which
/// builds a finite-difference approximation instead.
pub trait Jacobian: Model {
    /// Evaluate `∂f/∂p` at `p` into `jac`, row-major `n x m`: row `i`
    /// holds the gradient of the `i`-th model output.
    fn jacobian(&self, p: &[Self::Real], jac: &mut [Self::Real]);
}

/// Why a solve call failed.
///
/// Configuration errors are detected before the model is evaluated even
/// once. The two numerical variants carry the full [`Diagnostics`] record,
/// and the caller's parameter slice is left holding the last accepted
/// estimate.
#[derive(thiserror::Error, Debug)]
pub enum SolveError<T> {
    /// Fewer measurements than unknowns; the problem is underdetermined.
    #[error("cannot solve a problem with fewer measurements ({observations}) than parameters ({params})")]
    Underdetermined {
        /// Number of model outputs, `n`.
        observations: usize,
        /// Number of parameters, `m`.
        params: usize,
    },
    /// The model reported zero parameters or zero observations.
    #[error("cannot solve an empty problem")]
    Empty,
    /// The parameter slice does not match the model's parameter count.
    #[error("parameter slice has {got} elements but the model has {expected} parameters")]
    ParameterLength {
        /// `m` as reported by the model.
        expected: usize,
        /// Length of the slice the caller passed.
        got: usize,
    },
    /// The measurement vector does not match the model's output count.
    #[error("measurement vector has {got} elements but the model produces {expected}")]
    TargetLength {
        /// `n` as reported by the model.
        expected: usize,
        /// Length of the vector the caller passed.
        got: usize,
    },
    /// The caller-supplied workspace is too small for this problem.
    #[error("workspace holds {got} scalars but this problem needs {needed}")]
    WorkspaceTooSmall {
        /// Required capacity for this problem and engine.
        needed: usize,
        /// Capacity of the workspace the caller passed.
        got: usize,
    },
    /// The augmented normal equations became numerically singular
    /// ([`StopReason::SingularUpdate`]). Restarting from the current
    /// estimate with a larger damping scale may recover.
    #[error("augmented normal equations are near singular; restart with a larger damping scale")]
    NearSingular(Diagnostics<T>),
    /// The model produced a NaN or infinite value
    /// ([`StopReason::InvalidModelOutput`]); this is a defect in the
    /// model function.
    #[error("model produced a non-finite value")]
    NonFiniteResidual(Diagnostics<T>),
}

/// Convert a literal constant into the solver's scalar type.
pub(crate) fn real<T: Float>(x: f64) -> T {
    T::from(x).expect("scalar type must represent the solver's constants")
}
