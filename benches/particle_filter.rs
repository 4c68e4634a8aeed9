use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dynestim::distributions::MultivariateNormal;
use dynestim::resample::SystematicResampler;
use dynestim::{ParticleFilter, StateEstimator};
use nalgebra::{DMatrix, DVector};

fn build_filter(n: usize, seed: u64) -> ParticleFilter {
    let dynamics = |x: &DVector<f64>, _u: &DVector<f64>, _t: u64| x * 0.9;
    let measurement = |x: &DVector<f64>, _u: &DVector<f64>, _t: u64| x.clone();
    let process_noise =
        MultivariateNormal::new(&DVector::zeros(1), &DMatrix::identity(1, 1)).unwrap();
    let measurement_noise =
        MultivariateNormal::new(&DVector::zeros(1), &DMatrix::identity(1, 1)).unwrap();
    let init_dist =
        MultivariateNormal::new(&DVector::zeros(1), &DMatrix::from_element(1, 1, 4.0)).unwrap();
    ParticleFilter::new(
        n,
        Box::new(dynamics),
        Box::new(measurement),
        Box::new(process_noise),
        Box::new(measurement_noise),
        Box::new(init_dist),
        SystematicResampler::default(),
        Some(seed),
    )
    .unwrap()
}

fn benchmark_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("particle_filter_step");
    let u = DVector::zeros(1);
    let y = DVector::from_element(1, 0.1);

    for n in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            let mut pf = build_filter(n, 0);
            b.iter(|| pf.step(black_box(&u), black_box(&y)).unwrap());
        });
    }
    group.finish();
}

fn benchmark_steady_state_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("particle_filter_predict_steady_state");
    let u = DVector::zeros(1);

    for n in [1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            let mut pf = build_filter(n, 0);
            // Warm the buffers so the benchmark measures the steady-state
            // allocation-free hot loop, not the first swap.
            pf.predict(&u).unwrap();
            b.iter(|| pf.predict(black_box(&u)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_step, benchmark_steady_state_predict);
criterion_main!(benches);
