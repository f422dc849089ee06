use criterion::{Criterion, criterion_group, criterion_main};
use marquardt::{Jacobian, Model, Options, Workspace, solve_analytic, solve_secant_with};

/// Three-parameter exponential model over a mid-size sample, large enough
/// that the blocked normal-equations path is exercised.
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

fn bench_solvers(c: &mut Criterion) {
    let model = Decay {
        times: (0..500).map(|i| 0.004 * i as f64).collect(),
    };
    let measurements: Vec<f64> = model
        .times
        .iter()
        .map(|&t| 3.0 * (-2.0 * t).exp() + 0.5)
        .collect();
    let opts = Options::default();

    c.bench_function("analytic_decay_500", |b| {
        b.iter(|| {
            let mut p = [1.0, 1.0, 0.0];
            solve_analytic(&model, &mut p, Some(&measurements), &opts).unwrap()
        });
    });

    // The secant engine reuses one workspace so the measured cost is the
    // iteration itself, not allocation.
    let mut ws = Workspace::secant(3, model.observations());
    c.bench_function("secant_decay_500", |b| {
        b.iter(|| {
            let mut p = [1.0, 1.0, 0.0];
            solve_secant_with(
                &model,
                &mut p,
                Some(&measurements),
                &opts,
                &mut marquardt::DenseLu::default(),
                Some(&mut ws),
                |_| {},
            )
            .unwrap()
        });
    });
}

criterion_group!(benches, bench_solvers);
criterion_main!(benches);
