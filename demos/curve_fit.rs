//! Fit an exponential decay to synthetic measurements with both engines.
//!
//! Run with `cargo run --example curve_fit`.

use marquardt::{Jacobian, Model, Options, solve_analytic, solve_secant};

/// `f(p) = p0 · exp(−p1·t) + p2`, sampled at fixed times.
struct Decay {
    times: Vec<f64>,
}

impl Model for Decay {
    type Real = f64;
    fn params(&self) -> usize {
        3
    }
    fn observations(&self) -> usize {
        self.times.len()
    }
    fn eval(&self, p: &[f64], out: &mut [f64]) {
        for (o, &t) in out.iter_mut().zip(&self.times) {
            *o = p[0] * (-p[1] * t).exp() + p[2];
        }
    }
}

impl Jacobian for Decay {
    fn jacobian(&self, p: &[f64], jac: &mut [f64]) {
        for (i, &t) in self.times.iter().enumerate() {
            let e = (-p[1] * t).exp();
            jac[i * 3] = e;
            jac[i * 3 + 1] = -p[0] * t * e;
            jac[i * 3 + 2] = 1.0;
        }
    }
}

fn main() {
    let model = Decay {
        times: (0..40).map(|i| 0.05 * i as f64).collect(),
    };

    // Ground truth (3.0, 2.0, 0.5) with a deterministic ripple as "noise".
    let measurements: Vec<f64> = model
        .times
        .iter()
        .enumerate()
        .map(|(i, &t)| 3.0 * (-2.0 * t).exp() + 0.5 + 0.001 * ((i * 7 % 13) as f64 - 6.0))
        .collect();

    let opts = Options::default().with_covariance(true);

    let mut p = [1.0, 1.0, 0.0];
    let solution = solve_analytic(&model, &mut p, Some(&measurements), &opts)
        .expect("analytic fit should converge");
    println!("analytic engine:");
    println!("  p = {p:?}");
    println!(
        "  {} iterations, {} model evals, {} jacobian evals, stop {:?}",
        solution.iterations,
        solution.report.model_evals,
        solution.report.jacobian_evals,
        solution.report.stop,
    );
    if let Some(covar) = &solution.covariance {
        let sd: Vec<f64> = (0..3).map(|i| marquardt::stddev(covar, 3, i)).collect();
        println!("  parameter standard deviations = {sd:?}");
    }

    let mut p = [1.0, 1.0, 0.0];
    let solution = solve_secant(&model, &mut p, Some(&measurements), &opts)
        .expect("secant fit should converge");
    println!("secant engine (forward differences):");
    println!("  p = {p:?}");
    println!(
        "  {} iterations, {} model evals, {} jacobian refreshes, stop {:?}",
        solution.iterations,
        solution.report.model_evals,
        solution.report.jacobian_evals,
        solution.report.stop,
    );
}
