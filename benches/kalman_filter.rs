use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dynestim::{GaussianBelief, KalmanFilter, StateEstimator, UnscentedKalmanFilter};
use nalgebra::{DMatrix, DVector};

fn build_kf(nx: usize) -> KalmanFilter {
    let a = DMatrix::identity(nx, nx) * 0.9;
    let b = DMatrix::identity(nx, nx);
    let c = DMatrix::identity(nx, nx);
    let d = DMatrix::zeros(nx, nx);
    let q = DMatrix::identity(nx, nx);
    let r = DMatrix::identity(nx, nx);
    let init = GaussianBelief::new(DVector::zeros(nx), DMatrix::identity(nx, nx) * 4.0);
    KalmanFilter::new_constant(a, b, c, d, q, r, init).unwrap()
}

fn build_ukf(nx: usize) -> UnscentedKalmanFilter {
    let dynamics = move |x: &DVector<f64>, u: &DVector<f64>, _t: u64| x * 0.9 + u;
    let measurement = |x: &DVector<f64>, _u: &DVector<f64>, _t: u64| x.clone();
    let q = DMatrix::identity(nx, nx);
    let r = DMatrix::identity(nx, nx);
    let init = GaussianBelief::new(DVector::zeros(nx), DMatrix::identity(nx, nx) * 4.0);
    UnscentedKalmanFilter::new(
        Box::new(dynamics),
        Box::new(measurement),
        q,
        r,
        init,
        Default::default(),
        nx,
        nx,
    )
    .unwrap()
}

fn benchmark_kalman_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("kalman_filter_step");
    for nx in [2, 8, 32].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(nx), nx, |b, &nx| {
            let mut kf = build_kf(nx);
            let u = DVector::zeros(nx);
            let y = DVector::zeros(nx);
            b.iter(|| kf.step(black_box(&u), black_box(&y)).unwrap());
        });
    }
    group.finish();
}

fn benchmark_ukf_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("unscented_kalman_filter_step");
    for nx in [2, 8, 32].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(nx), nx, |b, &nx| {
            let mut ukf = build_ukf(nx);
            let u = DVector::zeros(nx);
            let y = DVector::zeros(nx);
            b.iter(|| ukf.step(black_box(&u), black_box(&y)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_kalman_step, benchmark_ukf_step);
criterion_main!(benches);
