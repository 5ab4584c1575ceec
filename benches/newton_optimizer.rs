//! Benchmark the Newton trajectory optimizer (component C5) on the pendulum
//! plugin across a handful of horizon lengths, and the affine-LQR Riccati
//! sweep (component C4) it spends most of its time in, in isolation.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::{SMatrix, SVector};

use bicycle_trajectory_engine::affine_lqr::AffineLqrProblem;
use bicycle_trajectory_engine::config::{ArmijoConfig, NewtonConfig};
use bicycle_trajectory_engine::cost::pendulum_weights;
use bicycle_trajectory_engine::dynamics::pendulum::{PendulumDynamics, PendulumParams};
use bicycle_trajectory_engine::newton::NewtonOptimizer;

fn swing_up_problem(t_len: usize) -> (Vec<SVector<f64, 2>>, Vec<SVector<f64, 1>>, Vec<SVector<f64, 2>>, Vec<SVector<f64, 1>>) {
    let params = PendulumParams::default();
    let x_ref = vec![SVector::<f64, 2>::new(0.3, 0.0); t_len];
    let u_ref = vec![SVector::<f64, 1>::new(params.k_eq() * 0.3_f64.sin()); t_len - 1];
    let x_init = vec![SVector::<f64, 2>::zeros(); t_len];
    let u_init = vec![SVector::<f64, 1>::zeros(); t_len - 1];
    (x_init, u_init, x_ref, u_ref)
}

fn bench_newton_optimizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("newton_optimizer_pendulum");
    for &t_len in &[30usize, 60, 120] {
        group.bench_with_input(BenchmarkId::from_parameter(t_len), &t_len, |b, &t_len| {
            let dynamics = PendulumDynamics::new(PendulumParams::default());
            let weights = pendulum_weights();
            let optimizer = NewtonOptimizer::new(
                dynamics,
                weights,
                ArmijoConfig::default(),
                NewtonConfig { k_max: 30, term_tol: 1e-6 },
            );
            b.iter(|| {
                let (x_init, u_init, x_ref, u_ref) = swing_up_problem(t_len);
                optimizer
                    .solve(x_init, u_init, &x_ref, &u_ref, false, &|| false)
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_affine_lqr_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("affine_lqr_riccati_sweep");
    for &t_len in &[50usize, 200, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(t_len), &t_len, |b, &t_len| {
            let a = SMatrix::<f64, 6, 6>::identity();
            let bmat = SMatrix::<f64, 6, 2>::from_element(0.01);
            let q = SMatrix::<f64, 6, 6>::identity();
            let r = SMatrix::<f64, 2, 2>::identity() * 0.1;
            let x0 = SVector::<f64, 6>::from_element(0.1);
            b.iter(|| {
                AffineLqrProblem::solve_pure(
                    vec![a; t_len - 1],
                    vec![bmat; t_len - 1],
                    vec![q; t_len - 1],
                    vec![r; t_len - 1],
                    q,
                    x0,
                )
                .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_newton_optimizer, bench_affine_lqr_sweep);
criterion_main!(benches);
