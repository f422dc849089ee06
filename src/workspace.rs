//! Scratch memory for a solve: one contiguous allocation, carved into
//! named non-overlapping slices.
//!
//! Steady-state iteration performs no allocation. Callers solving many
//! problems of the same shape build a [`Workspace`] once and pass it to
//! every call; otherwise the engine allocates one for the duration of the
//! call.

use num_traits::Float;

/// Reusable scratch buffer for [`solve_analytic_with`](crate::solve_analytic_with)
/// and [`solve_secant_with`](crate::solve_secant_with).
///
/// The required capacity is a closed form of the problem shape:
/// `2n + 4m + n·m + m²` scalars for the analytic engine and
/// `4n + 4m + n·m + m²` for the secant engine, which needs two extra
/// length-`n` buffers for difference probing. A workspace built for the
/// secant engine is always large enough for the analytic one.
pub struct Workspace<T> {
    buf: Vec<T>,
}

impl<T: Float> Workspace<T> {
    /// Scratch sized for the analytic engine on an `m`-parameter,
    /// `n`-observation problem.
    pub fn analytic(m: usize, n: usize) -> Self {
        Self {
            buf: vec![T::zero(); Self::analytic_len(m, n)],
        }
    }

    /// Scratch sized for the secant (finite-difference) engine.
    pub fn secant(m: usize, n: usize) -> Self {
        Self {
            buf: vec![T::zero(); Self::secant_len(m, n)],
        }
    }

    /// Required capacity for the analytic engine.
    pub const fn analytic_len(m: usize, n: usize) -> usize {
        2 * n + 4 * m + n * m + m * m
    }

    /// Required capacity for the secant engine.
    pub const fn secant_len(m: usize, n: usize) -> usize {
        4 * n + 4 * m + n * m + m * m
    }

    /// Number of scalars this workspace holds.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the workspace holds no scalars at all.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Partition the buffer into the engine's named scratch arrays.
    ///
    /// Layout order matches the size formulas above; for the analytic
    /// engine the two probe slices come out empty. The caller must have
    /// checked capacity beforehand.
    pub(crate) fn views(&mut self, m: usize, n: usize, probing: bool) -> Views<'_, T> {
        let (e, rest) = self.buf.split_at_mut(n);
        let (hx, rest) = rest.split_at_mut(n);
        let (jac_te, rest) = rest.split_at_mut(m);
        let (jac, rest) = rest.split_at_mut(n * m);
        let (jtj, rest) = rest.split_at_mut(m * m);
        let (dp, rest) = rest.split_at_mut(m);
        let (diag, rest) = rest.split_at_mut(m);
        let (p_new, rest) = rest.split_at_mut(m);
        let probe_len = if probing { n } else { 0 };
        let (probe, rest) = rest.split_at_mut(probe_len);
        let (probe2, _) = rest.split_at_mut(probe_len);

        Views {
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
        }
    }
}

/// The named scratch arrays of one solve, borrowed from a [`Workspace`].
pub(crate) struct Views<'a, T> {
    /// Residual `x − f(p)` at the current estimate, length `n`.
    pub e: &'a mut [T],
    /// Model output `f(p)`, length `n`.
    pub hx: &'a mut [T],
    /// Gradient `Jᵗe`, length `m`.
    pub jac_te: &'a mut [T],
    /// Jacobian, row-major `n x m`.
    pub jac: &'a mut [T],
    /// Normal matrix `JᵗJ`, row-major `m x m`.
    pub jtj: &'a mut [T],
    /// Step `Δp`, length `m`.
    pub dp: &'a mut [T],
    /// Saved `JᵗJ` diagonal, so augmentation can be cancelled; length `m`.
    pub diag: &'a mut [T],
    /// Candidate point `p + Δp`, length `m`.
    pub p_new: &'a mut [T],
    /// Probe buffer for difference schemes and candidate outputs, length
    /// `n` (secant engine only).
    pub probe: &'a mut [T],
    /// Second probe buffer, length `n` (secant engine only).
    pub probe2: &'a mut [T],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_form_sizes() {
        assert_eq!(Workspace::<f64>::analytic_len(3, 7), 14 + 12 + 21 + 9);
        assert_eq!(
            Workspace::<f64>::secant_len(3, 7),
            Workspace::<f64>::analytic_len(3, 7) + 14
        );
        assert_eq!(Workspace::<f64>::analytic(3, 7).len(), 56);
        assert!(!Workspace::<f64>::analytic(1, 1).is_empty());
    }

    #[test]
    fn partition_covers_buffer_without_overlap() {
        let (m, n) = (4, 9);
        let mut ws = Workspace::<f64>::secant(m, n);
        let v = ws.views(m, n, true);
        let total = v.e.len()
            + v.hx.len()
            + v.jac_te.len()
            + v.jac.len()
            + v.jtj.len()
            + v.dp.len()
            + v.diag.len()
            + v.p_new.len()
            + v.probe.len()
            + v.probe2.len();
        assert_eq!(total, Workspace::<f64>::secant_len(m, n));
        assert_eq!(v.jac.len(), n * m);
        assert_eq!(v.jtj.len(), m * m);
    }

    #[test]
    fn analytic_partition_has_no_probes() {
        let (m, n) = (2, 5);
        let mut ws = Workspace::<f64>::analytic(m, n);
        let v = ws.views(m, n, false);
        assert!(v.probe.is_empty());
        assert!(v.probe2.is_empty());
    }
}
