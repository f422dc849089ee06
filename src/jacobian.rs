//! Finite-difference Jacobian approximation and the rank-1 secant update.
//!
//! The secant engine refreshes the Jacobian by full differences only
//! occasionally; between refreshes it applies Broyden corrections that
//! cost no extra model evaluations.

use crate::{Model, real};
use num_traits::{Float, One};

/// Forward-difference approximation of the Jacobian at `p`.
///
/// `hx` must hold `f(p)`; each column costs one extra evaluation into
/// `probe`. The per-column step is `max(1e-4·|p_j|, delta)` so the probe
/// stays meaningful for large parameter magnitudes. `p_tmp` is scratch for
/// the perturbed parameter vector; the caller's `p` is never touched.
pub(crate) fn forward_differences<M: Model + ?Sized>(
    model: &M,
    p: &[M::Real],
    hx: &[M::Real],
    p_tmp: &mut [M::Real],
    probe: &mut [M::Real],
    delta: M::Real,
    jac: &mut [M::Real],
) {
    let m = p.len();
    let floor = real::<M::Real>(1e-4);

    p_tmp.copy_from_slice(p);
    for j in 0..m {
        let mut d = (floor * p[j]).abs();
        if d < delta {
            d = delta;
        }

        p_tmp[j] = p[j] + d;
        model.eval(p_tmp, probe);
        p_tmp[j] = p[j];

        let inv = M::Real::one() / d;
        for (i, (&fwd, &base)) in probe.iter().zip(hx).enumerate() {
            jac[i * m + j] = (fwd - base) * inv;
        }
    }
}

/// Central-difference approximation of the Jacobian at `p`.
///
/// Twice as many evaluations as the forward scheme (`probe_lo` and
/// `probe_hi` each get one per column) for one extra order of accuracy.
pub(crate) fn central_differences<M: Model + ?Sized>(
    model: &M,
    p: &[M::Real],
    p_tmp: &mut [M::Real],
    probe_lo: &mut [M::Real],
    probe_hi: &mut [M::Real],
    delta: M::Real,
    jac: &mut [M::Real],
) {
    let m = p.len();
    let floor = real::<M::Real>(1e-4);
    let half = real::<M::Real>(0.5);

    p_tmp.copy_from_slice(p);
    for j in 0..m {
        let mut d = (floor * p[j]).abs();
        if d < delta {
            d = delta;
        }

        p_tmp[j] = p[j] - d;
        model.eval(p_tmp, probe_lo);
        p_tmp[j] = p[j] + d;
        model.eval(p_tmp, probe_hi);
        p_tmp[j] = p[j];

        let inv = half / d;
        for (i, (&hi, &lo)) in probe_hi.iter().zip(probe_lo.iter()).enumerate() {
            jac[i * m + j] = (hi - lo) * inv;
        }
    }
}

/// Broyden's rank-1 secant correction.
///
/// Updates every row of `jac` so the approximation maps the step `dp` onto
/// the observed output change:
/// `J[i,:] += ((f_new[i] − f_old[i] − (J·dp)[i]) / ‖dp‖²) · dpᵗ`.
/// `dp_norm_sq` must be the squared norm of `dp` and strictly positive.
pub(crate) fn broyden_update<T: Float>(
    jac: &mut [T],
    dp: &[T],
    f_new: &[T],
    f_old: &[T],
    dp_norm_sq: T,
    m: usize,
) {
    for (i, (&fi_new, &fi_old)) in f_new.iter().zip(f_old).enumerate() {
        let row = &mut jac[i * m..(i + 1) * m];

        let mut jdp = T::zero();
        for (&jv, &dpj) in row.iter().zip(dp) {
            jdp = jdp + jv * dpj;
        }

        let t = (fi_new - fi_old - jdp) / dp_norm_sq;
        for (jv, &dpj) in row.iter_mut().zip(dp) {
            *jv = *jv + t * dpj;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Model;
    use approx::assert_relative_eq;

    /// f0 = p0^2 * p1, f1 = sin(p0), f2 = p0 + 3 p1
    struct Curvy;

    impl Model for Curvy {
        type Real = f64;
        fn params(&self) -> usize {
            2
        }
        fn observations(&self) -> usize {
            3
        }
        fn eval(&self, p: &[f64], out: &mut [f64]) {
            out[0] = p[0] * p[0] * p[1];
            out[1] = p[0].sin();
            out[2] = p[0] + 3.0 * p[1];
        }
    }

    fn analytic_jac(p: &[f64]) -> [f64; 6] {
        [
            2.0 * p[0] * p[1],
            p[0] * p[0],
            p[0].cos(),
            0.0,
            1.0,
            3.0,
        ]
    }

    #[test]
    fn forward_differences_approximate_derivatives() {
        let model = Curvy;
        let p = [1.3, -0.7];
        let mut hx = [0.0; 3];
        model.eval(&p, &mut hx);

        let mut p_tmp = [0.0; 2];
        let mut probe = [0.0; 3];
        let mut jac = [0.0; 6];
        forward_differences(&model, &p, &hx, &mut p_tmp, &mut probe, 1e-6, &mut jac);

        for (got, want) in jac.iter().zip(analytic_jac(&p)) {
            assert_relative_eq!(got, &want, epsilon = 1e-3);
        }
        // The probing must not disturb the evaluation point.
        assert_eq!(p, [1.3, -0.7]);
    }

    #[test]
    fn central_differences_are_more_accurate() {
        let model = Curvy;
        let p = [1.3, -0.7];
        let mut p_tmp = [0.0; 2];
        let mut lo = [0.0; 3];
        let mut hi = [0.0; 3];
        let mut jac = [0.0; 6];
        central_differences(&model, &p, &mut p_tmp, &mut lo, &mut hi, 1e-6, &mut jac);

        for (got, want) in jac.iter().zip(analytic_jac(&p)) {
            assert_relative_eq!(got, &want, epsilon = 1e-7);
        }
    }

    #[test]
    fn broyden_satisfies_secant_equation() {
        let m = 2;
        let mut jac = [1.0, 0.0, 0.0, 1.0, 2.0, -1.0];
        let dp = [0.3, -0.2];
        let f_old = [1.0, 2.0, 3.0];
        let f_new = [1.5, 1.9, 3.2];
        let dp_sq = dp[0] * dp[0] + dp[1] * dp[1];

        broyden_update(&mut jac, &dp, &f_new, &f_old, dp_sq, m);

        // After the update, J·dp must reproduce the observed change.
        for i in 0..3 {
            let jdp = jac[i * m] * dp[0] + jac[i * m + 1] * dp[1];
            assert_relative_eq!(jdp, f_new[i] - f_old[i], epsilon = 1e-12);
        }
    }
}
