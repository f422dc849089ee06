//! The damped normal-equations iteration engines and their public entry
//! points.
//!
//! Both engines share the same outer shape: form `JᵗJ` and `Jᵗe`, augment
//! the diagonal with the damping factor `mu`, solve for a step, and score
//! the step by comparing the actual error reduction `dF` against the
//! reduction `dL` predicted by the local linear model. Accepted steps
//! shrink `mu` (Nielsen's update, clamped below at 1/3); rejected steps
//! multiply `mu` by a doubling factor `nu`. They differ in where the
//! Jacobian comes from: [`solve_analytic`] asks the model, while
//! [`solve_secant`] maintains a finite-difference approximation with
//! rank-1 Broyden corrections between full refreshes.

use faer::mat::MatRef;
use faer_traits::ComplexField;
use num_traits::{Float, NumCast, One, ToPrimitive, Zero};

use crate::workspace::Views;
use crate::{Jacobian, Model, SolveError, Workspace, jacobian, linalg, real};
use crate::linalg::{DenseLu, LinearSolver};

/// Tuning knobs and stopping thresholds for a solve.
///
/// The defaults reproduce the classical choices: `tau = 1e-3` and all
/// three stopping thresholds at `1e-17`, which in practice means the
/// solver runs until the iteration budget or a numerically meaningful
/// stop. Thresholds compare against squared norms where the
/// [`Diagnostics`] field does.
#[derive(Clone, Copy, Debug)]
pub struct Options<T> {
    /// Scale factor for the initial damping: `mu = tau · max(diag JᵗJ)`.
    pub tau: T,
    /// Stop when `‖Jᵗe‖∞` falls to this value (first-order optimality).
    pub grad_tol: T,
    /// Stop when the squared step is at most `step_tol²·‖p‖²` (relative
    /// step size).
    pub step_tol: T,
    /// Stop when the squared residual norm falls to this value.
    pub residual_tol: T,
    /// Finite-difference step (secant engine only). A positive value
    /// selects forward differences with that step; a negative value
    /// selects central differences with step `|delta|`.
    pub delta: T,
    /// Outer-iteration budget.
    pub max_iter: usize,
    /// Compute the covariance of the fitted parameters on success.
    pub covariance: bool,
}

impl<T: Float> Default for Options<T> {
    fn default() -> Self {
        Self {
            tau: real(1e-3),
            grad_tol: real(1e-17),
            step_tol: real(1e-17),
            residual_tol: real(1e-17),
            delta: real(1e-6),
            max_iter: 100,
            covariance: false,
        }
    }
}

impl<T: Float> Options<T> {
    /// Set the initial damping scale.
    pub fn with_tau(mut self, tau: T) -> Self {
        self.tau = tau;
        self
    }
    /// Set the gradient infinity-norm stopping threshold.
    pub fn with_grad_tol(mut self, tol: T) -> Self {
        self.grad_tol = tol;
        self
    }
    /// Set the relative step-size stopping threshold.
    pub fn with_step_tol(mut self, tol: T) -> Self {
        self.step_tol = tol;
        self
    }
    /// Set the squared-residual stopping threshold.
    pub fn with_residual_tol(mut self, tol: T) -> Self {
        self.residual_tol = tol;
        self
    }
    /// Use forward differences with the given step in the secant engine.
    pub fn with_forward_differences(mut self, step: T) -> Self {
        self.delta = step.abs();
        self
    }
    /// Use central differences with the given step in the secant engine:
    /// twice the evaluations of the forward scheme, one order more
    /// accurate.
    pub fn with_central_differences(mut self, step: T) -> Self {
        self.delta = -step.abs();
        self
    }
    /// Set the outer-iteration budget.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }
    /// Request the covariance matrix of the fitted parameters.
    pub fn with_covariance(mut self, enabled: bool) -> Self {
        self.covariance = enabled;
        self
    }
}

/// Why iteration ended. The numeric codes form a closed 1..=7 set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// `‖Jᵗe‖∞` fell below the gradient threshold; the estimate is
    /// first-order optimal.
    SmallGradient = 1,
    /// The relative step size fell below the step threshold.
    SmallStep = 2,
    /// The outer-iteration budget was exhausted.
    IterationLimit = 3,
    /// The solved step blew up: the augmented system is near singular.
    /// Reported as an error; restarting with a larger `tau` may recover.
    SingularUpdate = 4,
    /// `nu` overflowed while growing the damping: no step that reduces
    /// the error can be found. Restarting with a larger `tau` may recover.
    NoFurtherReduction = 5,
    /// The squared residual norm fell below the residual threshold.
    SmallResidual = 6,
    /// The model returned NaN or infinity. Reported as an error; this is
    /// a defect in the model function.
    InvalidModelOutput = 7,
}

impl StopReason {
    /// The classical numeric code for this reason.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether this reason is surfaced as a [`SolveError`] rather than a
    /// successful [`Solution`].
    pub fn is_failure(self) -> bool {
        matches!(self, Self::SingularUpdate | Self::InvalidModelOutput)
    }
}

/// Snapshot handed to the iteration observer once per outer iteration.
#[derive(Clone, Copy, Debug)]
pub struct IterationStats<T> {
    /// Outer iteration number, starting at zero.
    pub iter: usize,
    /// Squared residual norm at the current estimate.
    pub residual_sq: T,
    /// Current damping factor (zero until the first Jacobian is formed).
    pub mu: T,
}

/// The fixed-shape record describing how a solve went.
#[derive(Clone, Copy, Debug)]
pub struct Diagnostics<T> {
    /// Squared residual norm at the initial estimate.
    pub initial_residual_sq: T,
    /// Squared residual norm at the final estimate.
    pub residual_sq: T,
    /// `‖Jᵗe‖∞` at the final estimate.
    pub gradient_inf_norm: T,
    /// Squared norm of the last step.
    pub step_sq: T,
    /// Final `mu` normalized by the largest `JᵗJ` diagonal entry (zero if
    /// no Jacobian was ever formed).
    pub scaled_mu: T,
    /// Outer iterations performed.
    pub iterations: usize,
    /// Why iteration ended.
    pub stop: StopReason,
    /// Model evaluations performed.
    pub model_evals: usize,
    /// Jacobian evaluations (analytic calls or finite-difference
    /// refreshes) performed.
    pub jacobian_evals: usize,
}

/// A successful solve. The fitted parameters are in the slice the caller
/// passed; this carries everything else.
#[derive(Clone, Debug)]
pub struct Solution<T> {
    /// Outer iterations performed.
    pub iterations: usize,
    /// The full diagnostics record.
    pub report: Diagnostics<T>,
    /// Covariance of the fitted parameters (row-major `m x m`), when
    /// requested via [`Options::with_covariance`] and computable.
    pub covariance: Option<Vec<T>>,
}

/// Minimize `‖x − f(p)‖²` using the model's analytic Jacobian.
///
/// `p` holds the initial estimate and is updated in place; on both
/// success and numerical failure it ends at the last accepted estimate.
/// `target` is the measurement vector `x`; `None` fits against zero.
/// Uses a dense LU on the augmented normal equations and allocates its
/// own scratch; see [`solve_analytic_with`] for full control.
pub fn solve_analytic<M>(
    model: &M,
    p: &mut [M::Real],
    target: Option<&[M::Real]>,
    opts: &Options<M::Real>,
) -> Result<Solution<M::Real>, SolveError<M::Real>>
where
    M: Jacobian + ?Sized,
    M::Real: ComplexField<Real = M::Real> + Float,
{
    let mut lin = DenseLu::default();
    solve_analytic_with(model, p, target, opts, &mut lin, None, |_| {})
}

/// [`solve_analytic`] with an injected linear solver, an optional
/// caller-owned [`Workspace`], and a per-iteration observer.
pub fn solve_analytic_with<M, L, F>(
    model: &M,
    p: &mut [M::Real],
    target: Option<&[M::Real]>,
    opts: &Options<M::Real>,
    lin: &mut L,
    workspace: Option<&mut Workspace<M::Real>>,
    mut on_iter: F,
) -> Result<Solution<M::Real>, SolveError<M::Real>>
where
    M: Jacobian + ?Sized,
    M::Real: ComplexField<Real = M::Real> + Float,
    L: LinearSolver<M::Real> + ?Sized,
    F: FnMut(&IterationStats<M::Real>),
{
    let (m, n) = validate(model, p, target)?;
    let needed = Workspace::<M::Real>::analytic_len(m, n);

    let mut local;
    let ws = match workspace {
        Some(ws) => {
            if ws.len() < needed {
                return Err(SolveError::WorkspaceTooSmall {
                    needed,
                    got: ws.len(),
                });
            }
            ws
        }
        None => {
            local = Workspace::analytic(m, n);
            &mut local
        }
    };

    let report = run_analytic(model, p, target, opts, lin, ws.views(m, n, false), &mut on_iter);
    finish(report, opts, ws, m, n)
}

/// Minimize `‖x − f(p)‖²` without an analytic Jacobian, approximating it
/// by finite differences with rank-1 secant updates between refreshes.
///
/// Same contract as [`solve_analytic`]; the difference scheme and step
/// come from [`Options::delta`].
pub fn solve_secant<M>(
    model: &M,
    p: &mut [M::Real],
    target: Option<&[M::Real]>,
    opts: &Options<M::Real>,
) -> Result<Solution<M::Real>, SolveError<M::Real>>
where
    M: Model + ?Sized,
    M::Real: ComplexField<Real = M::Real> + Float,
{
    let mut lin = DenseLu::default();
    solve_secant_with(model, p, target, opts, &mut lin, None, |_| {})
}

/// [`solve_secant`] with an injected linear solver, an optional
/// caller-owned [`Workspace`], and a per-iteration observer.
pub fn solve_secant_with<M, L, F>(
    model: &M,
    p: &mut [M::Real],
    target: Option<&[M::Real]>,
    opts: &Options<M::Real>,
    lin: &mut L,
    workspace: Option<&mut Workspace<M::Real>>,
    mut on_iter: F,
) -> Result<Solution<M::Real>, SolveError<M::Real>>
where
    M: Model + ?Sized,
    M::Real: ComplexField<Real = M::Real> + Float,
    L: LinearSolver<M::Real> + ?Sized,
    F: FnMut(&IterationStats<M::Real>),
{
    let (m, n) = validate(model, p, target)?;
    let needed = Workspace::<M::Real>::secant_len(m, n);

    let mut local;
    let ws = match workspace {
        Some(ws) => {
            if ws.len() < needed {
                return Err(SolveError::WorkspaceTooSmall {
                    needed,
                    got: ws.len(),
                });
            }
            ws
        }
        None => {
            local = Workspace::secant(m, n);
            &mut local
        }
    };

    let report = run_secant(model, p, target, opts, lin, ws.views(m, n, true), &mut on_iter);
    finish(report, opts, ws, m, n)
}

fn validate<M: Model + ?Sized>(
    model: &M,
    p: &[M::Real],
    target: Option<&[M::Real]>,
) -> Result<(usize, usize), SolveError<M::Real>> {
    let m = model.params();
    let n = model.observations();
    if m == 0 || n == 0 {
        return Err(SolveError::Empty);
    }
    if n < m {
        return Err(SolveError::Underdetermined {
            observations: n,
            params: m,
        });
    }
    if p.len() != m {
        return Err(SolveError::ParameterLength {
            expected: m,
            got: p.len(),
        });
    }
    if let Some(x) = target {
        if x.len() != n {
            return Err(SolveError::TargetLength {
                expected: n,
                got: x.len(),
            });
        }
    }
    Ok((m, n))
}

/// Classify the terminal stop and attach the covariance if requested.
fn finish<T>(
    report: Diagnostics<T>,
    opts: &Options<T>,
    ws: &mut Workspace<T>,
    m: usize,
    n: usize,
) -> Result<Solution<T>, SolveError<T>>
where
    T: ComplexField<Real = T> + Float,
{
    log::debug!(
        "solve finished: stop={:?} iterations={} evals={}/{} residual_sq={:?}",
        report.stop,
        report.iterations,
        report.model_evals,
        report.jacobian_evals,
        report.residual_sq.to_f64(),
    );

    match report.stop {
        StopReason::SingularUpdate => Err(SolveError::NearSingular(report)),
        StopReason::InvalidModelOutput => Err(SolveError::NonFiniteResidual(report)),
        _ => {
            let covariance = if opts.covariance {
                // The engines restore the diagonal on every exit path, so
                // the workspace holds the unaugmented JᵗJ here.
                let views = ws.views(m, n, false);
                linalg::covariance(views.jtj, m, n, report.residual_sq)
            } else {
                None
            };
            Ok(Solution {
                iterations: report.iterations,
                report,
                covariance,
            })
        }
    }
}

/// Analytic-Jacobian engine: one Jacobian evaluation per outer iteration,
/// with an inner loop that retries the damped step until it is accepted
/// or a stop condition fires.
fn run_analytic<M, L, F>(
    model: &M,
    p: &mut [M::Real],
    target: Option<&[M::Real]>,
    opts: &Options<M::Real>,
    lin: &mut L,
    views: Views<'_, M::Real>,
    on_iter: &mut F,
) -> Diagnostics<M::Real>
where
    M: Jacobian + ?Sized,
    M::Real: ComplexField<Real = M::Real> + Float,
    L: LinearSolver<M::Real> + ?Sized,
    F: FnMut(&IterationStats<M::Real>),
{
    let m = p.len();
    let n = model.observations();
    let Views {
        e,
        hx,
        jac_te,
        jac,
        jtj,
        dp,
        diag,
        p_new,
        ..
    } = views;

    let zero = M::Real::zero();
    let one = M::Real::one();
    let two = real::<M::Real>(2.0);
    let one_third = real::<M::Real>(1.0 / 3.0);
    let singular_floor = real::<M::Real>(1e-12);
    let eps2_sq = opts.step_tol * opts.step_tol;

    model.eval(p, hx);
    let mut model_evals = 1usize;
    let mut jacobian_evals = 0usize;
    let mut e_l2 = linalg::residual_into(e, target, hx);
    let initial_residual_sq = e_l2;
    let mut stop = (!e_l2.is_finite()).then_some(StopReason::InvalidModelOutput);

    let mut mu = zero;
    let mut nu: u32 = 2;
    let mut jac_te_inf = zero;
    let mut dp_l2 = M::Real::max_value();
    let mut k = 0usize;

    while k < opts.max_iter && stop.is_none() {
        on_iter(&IterationStats {
            iter: k,
            residual_sq: e_l2,
            mu,
        });

        if e_l2 <= opts.residual_tol {
            stop = Some(StopReason::SmallResidual);
            break;
        }

        model.jacobian(p, jac);
        jacobian_evals += 1;
        linalg::normal_equations(jac, e, jtj, jac_te, n, m);

        // ‖Jᵗe‖∞ and ‖p‖², saving the diagonal so augmentation can be
        // cancelled later.
        let mut p_l2 = zero;
        jac_te_inf = zero;
        for i in 0..m {
            let t = jac_te[i].abs();
            if t > jac_te_inf {
                jac_te_inf = t;
            }
            diag[i] = jtj[i * m + i];
            p_l2 = p_l2 + p[i] * p[i];
        }

        if jac_te_inf <= opts.grad_tol {
            dp_l2 = zero;
            stop = Some(StopReason::SmallGradient);
            break;
        }

        if k == 0 {
            let mut max_diag = M::Real::min_value();
            for &d in diag.iter() {
                if d > max_diag {
                    max_diag = d;
                }
            }
            mu = opts.tau * max_diag;
        }

        // Retry with growing damping until a step reduces the error.
        loop {
            linalg::augment_diagonal(jtj, m, mu);
            let solved = lin
                .solve(MatRef::from_row_major_slice(jtj, m, m), jac_te, dp)
                .is_ok();

            if solved {
                dp_l2 = zero;
                for i in 0..m {
                    let t = dp[i];
                    p_new[i] = p[i] + t;
                    dp_l2 = dp_l2 + t * t;
                }

                if dp_l2 <= eps2_sq * p_l2 {
                    stop = Some(StopReason::SmallStep);
                    break;
                }
                if dp_l2 >= (p_l2 + opts.step_tol) / (singular_floor * singular_floor) {
                    stop = Some(StopReason::SingularUpdate);
                    break;
                }

                model.eval(p_new, hx);
                model_evals += 1;
                let candidate_l2 = linalg::residual_in_place(hx, target);
                if !candidate_l2.is_finite() {
                    stop = Some(StopReason::InvalidModelOutput);
                    break;
                }

                // Predicted reduction of the local model vs the actual one.
                let mut dl = zero;
                for i in 0..m {
                    dl = dl + dp[i] * (mu * dp[i] + jac_te[i]);
                }
                let df = e_l2 - candidate_l2;

                if dl > zero && df > zero {
                    let t = two * df / dl - one;
                    let t = one - t * t * t;
                    mu = mu * if t >= one_third { t } else { one_third };
                    nu = 2;

                    p.copy_from_slice(p_new);
                    e.copy_from_slice(hx);
                    e_l2 = candidate_l2;
                    log::trace!("iteration {k}: step accepted, residual_sq={:?}", e_l2.to_f64());
                    break;
                }
            }

            // Either the system was not solved or the error did not
            // shrink: reject, grow the damping, and retry.
            log::trace!("iteration {k}: step rejected, nu={nu}");
            mu = mu * NumCast::from(nu).unwrap_or_else(M::Real::max_value);
            match nu.checked_mul(2) {
                Some(next) => nu = next,
                None => {
                    stop = Some(StopReason::NoFurtherReduction);
                    break;
                }
            }
            linalg::restore_diagonal(jtj, m, diag);
        }

        k += 1;
    }

    let stop = stop.unwrap_or(StopReason::IterationLimit);
    linalg::restore_diagonal(jtj, m, diag);

    Diagnostics {
        initial_residual_sq,
        residual_sq: e_l2,
        gradient_inf_norm: jac_te_inf,
        step_sq: dp_l2,
        scaled_mu: scaled_mu(jtj, m, mu),
        iterations: k,
        stop,
        model_evals,
        jacobian_evals,
    }
}

/// Secant engine: the Jacobian is rebuilt by full finite differences only
/// when it has gone stale (a long rejection streak, or `max(m, 10)`
/// rank-1 updates since the last refresh); otherwise accepted steps feed
/// Broyden corrections that cost nothing extra.
fn run_secant<M, L, F>(
    model: &M,
    p: &mut [M::Real],
    target: Option<&[M::Real]>,
    opts: &Options<M::Real>,
    lin: &mut L,
    views: Views<'_, M::Real>,
    on_iter: &mut F,
) -> Diagnostics<M::Real>
where
    M: Model + ?Sized,
    M::Real: ComplexField<Real = M::Real> + Float,
    L: LinearSolver<M::Real> + ?Sized,
    F: FnMut(&IterationStats<M::Real>),
{
    let m = p.len();
    let n = model.observations();
    let Views {
        e,
        hx,
        jac_te,
        jac,
        jtj,
        dp,
        diag,
        p_new,
        probe,
        probe2,
    } = views;

    let zero = M::Real::zero();
    let one = M::Real::one();
    let two = real::<M::Real>(2.0);
    let one_third = real::<M::Real>(1.0 / 3.0);
    let singular_floor = real::<M::Real>(1e-12);
    let eps2_sq = opts.step_tol * opts.step_tol;

    let central = opts.delta < zero;
    let delta = opts.delta.abs();
    let refresh_period = m.max(10);

    model.eval(p, hx);
    let mut model_evals = 1usize;
    let mut jacobian_evals = 0usize;
    let mut e_l2 = linalg::residual_into(e, target, hx);
    let initial_residual_sq = e_l2;
    let mut stop = (!e_l2.is_finite()).then_some(StopReason::InvalidModelOutput);

    let mut mu = zero;
    // Start high so the first iteration always builds a full Jacobian.
    let mut nu: u32 = 20;
    let mut updates_since_refresh = 0usize;
    let mut updated_p = true;
    let mut new_jacobian = false;
    let mut jac_te_inf = zero;
    let mut p_l2 = zero;
    let mut dp_l2 = M::Real::max_value();
    let mut k = 0usize;

    while k < opts.max_iter && stop.is_none() {
        on_iter(&IterationStats {
            iter: k,
            residual_sq: e_l2,
            mu,
        });

        if e_l2 <= opts.residual_tol {
            stop = Some(StopReason::SmallResidual);
            break;
        }

        if (updated_p && nu > 16) || updates_since_refresh == refresh_period {
            if central {
                jacobian::central_differences(model, p, p_new, probe, probe2, delta, jac);
                jacobian_evals += 1;
                model_evals += 2 * m;
            } else {
                jacobian::forward_differences(model, p, hx, p_new, probe, delta, jac);
                jacobian_evals += 1;
                model_evals += m;
            }
            nu = 2;
            updates_since_refresh = 0;
            updated_p = false;
            new_jacobian = true;
            log::debug!("iteration {k}: full finite-difference refresh");
        }

        if new_jacobian {
            new_jacobian = false;
            linalg::normal_equations(jac, e, jtj, jac_te, n, m);

            p_l2 = zero;
            jac_te_inf = zero;
            for i in 0..m {
                let t = jac_te[i].abs();
                if t > jac_te_inf {
                    jac_te_inf = t;
                }
                diag[i] = jtj[i * m + i];
                p_l2 = p_l2 + p[i] * p[i];
            }
        }

        if jac_te_inf <= opts.grad_tol {
            dp_l2 = zero;
            stop = Some(StopReason::SmallGradient);
            break;
        }

        if k == 0 {
            let mut max_diag = M::Real::min_value();
            for &d in diag.iter() {
                if d > max_diag {
                    max_diag = d;
                }
            }
            mu = opts.tau * max_diag;
        }

        linalg::augment_diagonal(jtj, m, mu);
        let solved = lin
            .solve(MatRef::from_row_major_slice(jtj, m, m), jac_te, dp)
            .is_ok();

        if solved {
            dp_l2 = zero;
            for i in 0..m {
                let t = dp[i];
                p_new[i] = p[i] + t;
                dp_l2 = dp_l2 + t * t;
            }

            if dp_l2 <= eps2_sq * p_l2 {
                stop = Some(StopReason::SmallStep);
                break;
            }
            if dp_l2 >= (p_l2 + opts.step_tol) / (singular_floor * singular_floor) {
                stop = Some(StopReason::SingularUpdate);
                break;
            }

            model.eval(p_new, probe);
            model_evals += 1;
            let candidate_l2 = linalg::residual_into(probe2, target, probe);
            if !candidate_l2.is_finite() {
                stop = Some(StopReason::InvalidModelOutput);
                break;
            }

            let df = e_l2 - candidate_l2;
            if updated_p || df > zero {
                // The candidate evaluation is information about the true
                // Jacobian; fold it in even if the step ends up rejected.
                jacobian::broyden_update(jac, dp, probe, hx, dp_l2, m);
                updates_since_refresh += 1;
                new_jacobian = true;
            }

            let mut dl = zero;
            for i in 0..m {
                dl = dl + dp[i] * (mu * dp[i] + jac_te[i]);
            }

            if dl > zero && df > zero {
                let t = two * df / dl - one;
                let t = one - t * t * t;
                mu = mu * if t >= one_third { t } else { one_third };
                nu = 2;

                p.copy_from_slice(p_new);
                e.copy_from_slice(probe2);
                hx.copy_from_slice(probe);
                e_l2 = candidate_l2;
                updated_p = true;
                log::trace!("iteration {k}: step accepted, residual_sq={:?}", e_l2.to_f64());
                k += 1;
                continue;
            }
        }

        // Rejected: grow the damping and retry with the same Jacobian.
        log::trace!("iteration {k}: step rejected, nu={nu}");
        mu = mu * NumCast::from(nu).unwrap_or_else(M::Real::max_value);
        match nu.checked_mul(2) {
            Some(next) => nu = next,
            None => {
                stop = Some(StopReason::NoFurtherReduction);
                break;
            }
        }
        linalg::restore_diagonal(jtj, m, diag);
        k += 1;
    }

    let stop = stop.unwrap_or(StopReason::IterationLimit);
    linalg::restore_diagonal(jtj, m, diag);

    Diagnostics {
        initial_residual_sq,
        residual_sq: e_l2,
        gradient_inf_norm: jac_te_inf,
        step_sq: dp_l2,
        scaled_mu: scaled_mu(jtj, m, mu),
        iterations: k,
        stop,
        model_evals,
        jacobian_evals,
    }
}

fn scaled_mu<T: Float>(jtj: &[T], m: usize, mu: T) -> T {
    let mut max_diag = T::min_value();
    for i in 0..m {
        if jtj[i * m + i] > max_diag {
            max_diag = jtj[i * m + i];
        }
    }
    if max_diag > T::zero() {
        mu / max_diag
    } else {
        T::zero()
    }
}
