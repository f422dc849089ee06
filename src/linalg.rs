//! Dense kernels for the normal equations, and the linear-solver strategy
//! used on the augmented system.
//!
//! The Jacobian is stored row-major (`n x m`) in a flat slice, the normal
//! matrix `JᵗJ` row-major `m x m`. Products are computed directly on the
//! slices; faer only enters the picture when factorizing.

use faer::linalg::solvers::{FullPivLu, Llt};
use faer::mat::MatRef;
use faer::prelude::Solve;
use faer::{Mat, Side};
use faer_traits::ComplexField;
use num_traits::Float;

/// Cache-block edge length for the large-problem `JᵗJ` path.
pub(crate) const BLOCK: usize = 32;

/// Form `JᵗJ` and `Jᵗe` from the current Jacobian and residual.
///
/// Small problems (`n·m` at most one cache block squared) use the
/// straightforward triple loop, which wins on overhead; larger ones go
/// through the blocked product and a row-streaming `Jᵗe` accumulation so
/// the Jacobian is walked in memory order. `JᵗJ` is symmetric, so only the
/// upper triangle is computed and mirrored down.
pub(crate) fn normal_equations<T: Float>(
    jac: &[T],
    e: &[T],
    jtj: &mut [T],
    jac_te: &mut [T],
    n: usize,
    m: usize,
) {
    if n * m <= BLOCK * BLOCK {
        for i in 0..m {
            for j in i..m {
                let mut sum = T::zero();
                for l in 0..n {
                    let row = l * m;
                    sum = sum + jac[row + i] * jac[row + j];
                }
                jtj[i * m + j] = sum;
                jtj[j * m + i] = sum;
            }
            let mut sum = T::zero();
            for l in 0..n {
                sum = sum + jac[l * m + i] * e[l];
            }
            jac_te[i] = sum;
        }
    } else {
        mul_transpose_self_blocked(jac, jtj, n, m);

        for g in jac_te.iter_mut() {
            *g = T::zero();
        }
        for i in 0..n {
            let row = &jac[i * m..(i + 1) * m];
            let ei = e[i];
            for (g, &jv) in jac_te.iter_mut().zip(row) {
                *g = *g + jv * ei;
            }
        }
    }
}

/// Blocked `JᵗJ` for Jacobians too large for the L1 cache.
///
/// Tiles both the column range and the summation range by [`BLOCK`],
/// accumulating partial sums per tile; only the upper triangle is
/// computed, then mirrored.
pub(crate) fn mul_transpose_self_blocked<T: Float>(a: &[T], b: &mut [T], n: usize, m: usize) {
    for jj in (0..m).step_by(BLOCK) {
        let j_end = (jj + BLOCK).min(m);
        for i in 0..m {
            for j in jj.max(i)..j_end {
                b[i * m + j] = T::zero();
            }
        }
        for kk in (0..n).step_by(BLOCK) {
            let k_end = (kk + BLOCK).min(n);
            for i in 0..m {
                for j in jj.max(i)..j_end {
                    let mut sum = T::zero();
                    for k in kk..k_end {
                        let row = k * m;
                        sum = sum + a[row + i] * a[row + j];
                    }
                    b[i * m + j] = b[i * m + j] + sum;
                }
            }
        }
    }

    for i in 0..m {
        for j in 0..i {
            b[i * m + j] = b[j * m + i];
        }
    }
}

/// `e = x − hx` (or `−hx` when there is no measurement vector) fused with
/// its squared L2 norm.
///
/// A NaN or infinity anywhere poisons the returned sum, which is how the
/// engines detect invalid model output.
pub(crate) fn residual_into<T: Float>(e: &mut [T], x: Option<&[T]>, hx: &[T]) -> T {
    let mut sum = T::zero();
    match x {
        Some(x) => {
            for ((ei, &xi), &hi) in e.iter_mut().zip(x).zip(hx) {
                let d = xi - hi;
                *ei = d;
                sum = sum + d * d;
            }
        }
        None => {
            for (ei, &hi) in e.iter_mut().zip(hx) {
                let d = -hi;
                *ei = d;
                sum = sum + d * d;
            }
        }
    }
    sum
}

/// In-place variant: `buf = x − buf`, returning the squared norm.
///
/// Used when probing a candidate step, where the model output buffer is
/// immediately reused as the candidate residual.
pub(crate) fn residual_in_place<T: Float>(buf: &mut [T], x: Option<&[T]>) -> T {
    let mut sum = T::zero();
    match x {
        Some(x) => {
            for (bi, &xi) in buf.iter_mut().zip(x) {
                let d = xi - *bi;
                *bi = d;
                sum = sum + d * d;
            }
        }
        None => {
            for bi in buf.iter_mut() {
                let d = -*bi;
                *bi = d;
                sum = sum + d * d;
            }
        }
    }
    sum
}

/// Add `mu` to every diagonal entry of the row-major `m x m` matrix.
pub(crate) fn augment_diagonal<T: Float>(a: &mut [T], m: usize, mu: T) {
    for i in 0..m {
        a[i * m + i] = a[i * m + i] + mu;
    }
}

/// Overwrite the diagonal with previously saved entries, cancelling any
/// augmentation.
pub(crate) fn restore_diagonal<T: Float>(a: &mut [T], m: usize, diag: &[T]) {
    for i in 0..m {
        a[i * m + i] = diag[i];
    }
}

/// Reported by a [`LinearSolver`] when it cannot produce a usable
/// solution. The iteration engines treat this as a rejected step and grow
/// the damping factor, so it never reaches the caller directly.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
#[error("linear system is singular")]
pub struct SingularSystem;

/// Strategy for solving the augmented normal equations `A·x = b` with `A`
/// square `m x m`.
///
/// Implementations that want to retain factorization workspace across
/// calls keep it in the strategy value itself; the same value can be
/// passed to repeated solves.
pub trait LinearSolver<T> {
    /// Solve `A·x = b`, writing into `x`.
    fn solve(&mut self, a: MatRef<'_, T>, b: &[T], x: &mut [T]) -> Result<(), SingularSystem>;
}

/// Full-pivot dense LU, the default strategy.
pub struct DenseLu<T: ComplexField<Real = T>> {
    lu: Option<FullPivLu<T>>,
}

impl<T: ComplexField<Real = T>> Default for DenseLu<T> {
    fn default() -> Self {
        Self { lu: None }
    }
}

impl<T: ComplexField<Real = T> + Float> LinearSolver<T> for DenseLu<T> {
    fn solve(&mut self, a: MatRef<'_, T>, b: &[T], x: &mut [T]) -> Result<(), SingularSystem> {
        let lu = self.lu.insert(a.full_piv_lu());

        let mut rhs = Mat::<T>::zeros(b.len(), 1);
        for (i, &bi) in b.iter().enumerate() {
            rhs[(i, 0)] = bi;
        }
        let sol = lu.solve(rhs.as_ref());
        for (i, xi) in x.iter_mut().enumerate() {
            *xi = sol[(i, 0)];
        }

        // Full pivoting never fails structurally; an exactly singular
        // system shows up as non-finite entries in the solution.
        if x.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(SingularSystem)
        }
    }
}

/// Dense Cholesky (LLᵀ) strategy.
///
/// Faster than LU, and a natural fit here: the augmented matrix
/// `JᵗJ + mu·I` is positive definite for any positive damping unless the
/// problem is badly scaled, in which case the factorization failure is
/// reported and absorbed as a rejected step.
pub struct DenseCholesky<T: ComplexField<Real = T>> {
    llt: Option<Llt<T>>,
}

impl<T: ComplexField<Real = T>> Default for DenseCholesky<T> {
    fn default() -> Self {
        Self { llt: None }
    }
}

impl<T: ComplexField<Real = T> + Float> LinearSolver<T> for DenseCholesky<T> {
    fn solve(&mut self, a: MatRef<'_, T>, b: &[T], x: &mut [T]) -> Result<(), SingularSystem> {
        let Ok(factor) = a.llt(Side::Lower) else {
            return Err(SingularSystem);
        };
        let llt = self.llt.insert(factor);

        let mut rhs = Mat::<T>::zeros(b.len(), 1);
        for (i, &bi) in b.iter().enumerate() {
            rhs[(i, 0)] = bi;
        }
        let sol = llt.solve(rhs.as_ref());
        for (i, xi) in x.iter_mut().enumerate() {
            *xi = sol[(i, 0)];
        }

        if x.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(SingularSystem)
        }
    }
}

/// Covariance of the fitted parameters: `sumsq/(n − m) · (JᵗJ)⁻¹`, with
/// `JᵗJ` the unaugmented normal matrix at the solution and `sumsq` the
/// final squared residual norm.
///
/// Returns `None` when `JᵗJ` is singular or the system has no residual
/// degrees of freedom (`n == m`). Row-major `m x m` output; the diagonal
/// holds the variance estimates of the parameters.
pub fn covariance<T>(jtj: &[T], m: usize, n: usize, sum_sq: T) -> Option<Vec<T>>
where
    T: ComplexField<Real = T> + Float,
{
    if n <= m || jtj.len() != m * m {
        return None;
    }

    let a = MatRef::from_row_major_slice(jtj, m, m);
    let inv = a.full_piv_lu().solve(Mat::<T>::identity(m, m).as_ref());
    let fact = sum_sq / T::from(n - m)?;

    let mut out = vec![T::zero(); m * m];
    for i in 0..m {
        for j in 0..m {
            out[i * m + j] = inv[(i, j)] * fact;
        }
    }
    out.iter().all(|v| v.is_finite()).then_some(out)
}

/// Standard deviation of fitted parameter `i`, read off a covariance
/// matrix from [`covariance`].
pub fn stddev<T: Float>(covar: &[T], m: usize, i: usize) -> T {
    covar[i * m + i].sqrt()
}

/// Pearson correlation coefficient of fitted parameters `i` and `j`.
pub fn correlation<T: Float>(covar: &[T], m: usize, i: usize, j: usize) -> T {
    covar[i * m + j] / (covar[i * m + i] * covar[j * m + j]).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn naive_transpose_self(a: &[f64], b: &mut [f64], n: usize, m: usize) {
        for i in 0..m {
            for j in 0..m {
                let mut sum = 0.0;
                for l in 0..n {
                    sum += a[l * m + i] * a[l * m + j];
                }
                b[i * m + j] = sum;
            }
        }
    }

    // Deterministic pseudo-random fill, enough to exercise the blocking.
    fn fill(v: &mut [f64]) {
        let mut state = 0x2545f4914f6cdd1d_u64;
        for x in v.iter_mut() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            *x = (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5;
        }
    }

    #[test]
    fn blocked_product_matches_naive() {
        // Big enough that both the column and summation tiling kick in.
        let (n, m) = (97, 41);
        let mut a = vec![0.0; n * m];
        fill(&mut a);

        let mut expected = vec![0.0; m * m];
        naive_transpose_self(&a, &mut expected, n, m);
        let mut got = vec![0.0; m * m];
        mul_transpose_self_blocked(&a, &mut got, n, m);

        for (g, e) in got.iter().zip(&expected) {
            assert_relative_eq!(g, e, max_relative = 1e-12);
        }
    }

    #[test]
    fn normal_equations_small_and_large_agree() {
        let (n, m) = (40, 30); // n*m > BLOCK^2, forces the blocked path
        let mut jac = vec![0.0; n * m];
        let mut e = vec![0.0; n];
        fill(&mut jac);
        fill(&mut e);

        let mut jtj_large = vec![0.0; m * m];
        let mut g_large = vec![0.0; m];
        normal_equations(&jac, &e, &mut jtj_large, &mut g_large, n, m);

        let mut jtj_naive = vec![0.0; m * m];
        naive_transpose_self(&jac, &mut jtj_naive, n, m);
        for (a, b) in jtj_large.iter().zip(&jtj_naive) {
            assert_relative_eq!(a, b, max_relative = 1e-12);
        }
    }

    #[test]
    fn residual_norm_detects_non_finite() {
        let hx = [1.0, f64::NAN, 3.0];
        let mut e = [0.0; 3];
        let sum = residual_into(&mut e, None, &hx);
        assert!(!sum.is_finite());

        let mut buf = [1.0, 2.0, f64::INFINITY];
        let sum = residual_in_place(&mut buf, Some(&[0.0, 0.0, 0.0]));
        assert!(!sum.is_finite());
    }

    #[test]
    fn dense_lu_solves_and_flags_singular() {
        let a = [4.0, 1.0, 1.0, 3.0];
        let b = [1.0, 2.0];
        let mut x = [0.0; 2];
        let mut lu = DenseLu::default();
        lu.solve(MatRef::from_row_major_slice(&a, 2, 2), &b, &mut x)
            .unwrap();
        assert_relative_eq!(4.0 * x[0] + x[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[0] + 3.0 * x[1], 2.0, epsilon = 1e-12);

        let singular = [1.0, 2.0, 2.0, 4.0];
        assert!(
            lu.solve(MatRef::from_row_major_slice(&singular, 2, 2), &b, &mut x)
                .is_err()
        );
    }

    #[test]
    fn cholesky_rejects_indefinite() {
        let indefinite = [1.0, 0.0, 0.0, -1.0];
        let b = [1.0, 1.0];
        let mut x = [0.0; 2];
        let mut chol = DenseCholesky::default();
        assert!(
            chol.solve(MatRef::from_row_major_slice(&indefinite, 2, 2), &b, &mut x)
                .is_err()
        );

        let spd = [2.0, 1.0, 1.0, 2.0];
        chol.solve(MatRef::from_row_major_slice(&spd, 2, 2), &b, &mut x)
            .unwrap();
        assert_relative_eq!(2.0 * x[0] + x[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn covariance_of_known_system() {
        // JᵗJ = diag(2, 8), sumsq = 4, n - m = 2  =>  C = diag(1, 0.25)
        let jtj = [2.0, 0.0, 0.0, 8.0];
        let c = covariance(&jtj, 2, 4, 4.0).unwrap();
        assert_relative_eq!(c[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(c[3], 0.25, epsilon = 1e-12);
        assert_relative_eq!(stddev(&c, 2, 1), 0.5, epsilon = 1e-12);
        assert_relative_eq!(correlation(&c, 2, 0, 1), 0.0, epsilon = 1e-12);

        // No residual degrees of freedom.
        assert!(covariance(&jtj, 2, 2, 4.0).is_none());
    }

    proptest! {
        #[test]
        fn augment_then_restore_is_identity(
            diag_vals in proptest::collection::vec(-1e6_f64..1e6, 1..8),
            mu in 0.0_f64..1e9,
            rounds in 1_usize..5,
        ) {
            let m = diag_vals.len();
            let mut a = vec![0.0; m * m];
            for (i, &d) in diag_vals.iter().enumerate() {
                a[i * m + i] = d;
            }
            let original = a.clone();
            let saved: Vec<f64> = (0..m).map(|i| a[i * m + i]).collect();

            for _ in 0..rounds {
                augment_diagonal(&mut a, m, mu);
                restore_diagonal(&mut a, m, &saved);
            }
            prop_assert_eq!(a, original);
        }
    }
}
