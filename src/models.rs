//! The dynamics, measurement, and likelihood callables a caller supplies,
//! wrapped behind a uniform capability set so every filter variant accepts
//! the same shapes of user code.

use nalgebra::DVector;
use rand::RngCore;

/// Deterministic state transition `x' = f(x, u, t)`.
///
/// Blanket-implemented for any matching closure, so callers can pass either
/// a plain `Fn` or a `struct` that captures model matrices/parameters, the
/// way the teacher's boxed `MotionModel` trait objects do.
pub trait DynamicsModel: Send + Sync {
    fn step(&self, x: &DVector<f64>, u: &DVector<f64>, t: u64) -> DVector<f64>;
}

impl<F> DynamicsModel for F
where
    F: Fn(&DVector<f64>, &DVector<f64>, u64) -> DVector<f64> + Send + Sync,
{
    fn step(&self, x: &DVector<f64>, u: &DVector<f64>, t: u64) -> DVector<f64> {
        self(x, u, t)
    }
}

/// Deterministic measurement `y = h(x, u, t)`.
pub trait MeasurementModel: Send + Sync {
    fn observe(&self, x: &DVector<f64>, u: &DVector<f64>, t: u64) -> DVector<f64>;
}

impl<F> MeasurementModel for F
where
    F: Fn(&DVector<f64>, &DVector<f64>, u64) -> DVector<f64> + Send + Sync,
{
    fn observe(&self, x: &DVector<f64>, u: &DVector<f64>, t: u64) -> DVector<f64> {
        self(x, u, t)
    }
}

/// Noise-injecting state transition used by [`crate::filters::AdvancedParticleFilter`],
/// where noise may be state-dependent rather than additive.
pub trait NoisyDynamicsModel: Send + Sync {
    fn sample_step(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        t: u64,
        rng: &mut dyn RngCore,
    ) -> DVector<f64>;
}

impl<F> NoisyDynamicsModel for F
where
    F: Fn(&DVector<f64>, &DVector<f64>, u64, &mut dyn RngCore) -> DVector<f64> + Send + Sync,
{
    fn sample_step(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        t: u64,
        rng: &mut dyn RngCore,
    ) -> DVector<f64> {
        self(x, u, t, rng)
    }
}

/// A measurement model that returns a log-density directly, for
/// non-additive or otherwise non-Gaussian observation noise.
pub trait MeasurementLikelihoodModel: Send + Sync {
    fn log_likelihood(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        y: &DVector<f64>,
        t: u64,
    ) -> f64;
}

impl<F> MeasurementLikelihoodModel for F
where
    F: Fn(&DVector<f64>, &DVector<f64>, &DVector<f64>, u64) -> f64 + Send + Sync,
{
    fn log_likelihood(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        y: &DVector<f64>,
        t: u64,
    ) -> f64 {
        self(x, u, y, t)
    }
}
