use nalgebra::{DMatrix, DVector};
use rand::RngCore;

use super::StateEstimator;
use crate::distributions::Distribution;
use crate::error::{EstimationError, Result};
use crate::models::{DynamicsModel, MeasurementModel};
use crate::random::RandomSource;
use crate::resample::SystematicResampler;
use crate::weights::WeightVector;

/// A bootstrap particle filter: additive process and measurement noise,
/// systematic resampling gated on effective sample size.
///
/// Particle propagation uses two preallocated buffers (`particles`,
/// `scratch`) swapped on every `predict`, so a filter already at steady
/// state does not allocate in its hot loop.
pub struct ParticleFilter {
    nx: usize,
    nu: usize,
    ny: usize,
    dynamics: Box<dyn DynamicsModel>,
    measurement: Box<dyn MeasurementModel>,
    process_noise: Box<dyn Distribution>,
    measurement_noise: Box<dyn Distribution>,
    init_dist: Box<dyn Distribution>,
    particles: Vec<DVector<f64>>,
    scratch: Vec<DVector<f64>>,
    log_weights: WeightVector,
    resampler: SystematicResampler,
    rng: RandomSource,
    loglik: f64,
    t: u64,
}

impl ParticleFilter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        n: usize,
        dynamics: Box<dyn DynamicsModel>,
        measurement: Box<dyn MeasurementModel>,
        process_noise: Box<dyn Distribution>,
        measurement_noise: Box<dyn Distribution>,
        init_dist: Box<dyn Distribution>,
        resampler: SystematicResampler,
        seed: Option<u64>,
    ) -> Result<Self> {
        if n < 1 {
            return Err(EstimationError::InvalidConfiguration(
                "number of particles must be at least 1".to_string(),
            ));
        }
        let nx = init_dist.dim();
        let nu = 0; // control dimension is not fixed by construction; validated lazily per call
        let ny = measurement_noise.dim();
        if process_noise.dim() != nx {
            return Err(EstimationError::DimensionMismatch {
                expected: nx,
                got: process_noise.dim(),
                what: "process noise distribution",
            });
        }

        let mut rng = match seed {
            Some(s) => RandomSource::from_seed(s),
            None => RandomSource::from_entropy(),
        };
        let particles: Vec<DVector<f64>> =
            (0..n).map(|_| init_dist.sample(rng.rng_mut())).collect();
        let scratch = particles.clone();
        let log_weights = WeightVector::uniform(n);

        Ok(ParticleFilter {
            nx,
            nu,
            ny,
            dynamics,
            measurement,
            process_noise,
            measurement_noise,
            init_dist,
            particles,
            scratch,
            log_weights,
            resampler,
            rng,
            loglik: 0.0,
            t: 0,
        })
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    pub fn particles(&self) -> &[DVector<f64>] {
        &self.particles
    }

    pub fn log_weights(&self) -> &WeightVector {
        &self.log_weights
    }

    pub fn exp_weights(&self) -> DVector<f64> {
        self.log_weights.expweights()
    }

    pub fn weighted_mean(&self) -> DVector<f64> {
        weighted_mean(&self.particles, &self.log_weights.expweights())
    }

    pub fn weighted_cov(&self) -> DMatrix<f64> {
        weighted_cov(&self.particles, &self.log_weights.expweights())
    }

    pub fn sample_measurement(&self, u: &DVector<f64>, rng: &mut dyn RngCore) -> DVector<f64> {
        let idx = crate::distributions::Categorical::from_log_weights(self.log_weights.as_slice())
            .sample_index(rng);
        let x = &self.particles[idx];
        let mean = self.measurement.observe(x, u, self.t);
        &mean + self.measurement_noise.sample(rng)
    }

    pub(crate) fn replace_particles(&mut self, new_particles: Vec<DVector<f64>>) {
        self.particles = new_particles;
    }

    pub(crate) fn log_weights_mut(&mut self) -> &mut WeightVector {
        &mut self.log_weights
    }

    pub(crate) fn set_t(&mut self, t: u64) {
        self.t = t;
    }

    pub(crate) fn add_loglik(&mut self, delta: f64) {
        self.loglik += delta;
    }

    pub(crate) fn sample_process_noise(&mut self) -> DVector<f64> {
        self.process_noise.sample(self.rng.rng_mut())
    }

    pub(crate) fn resample_with(&mut self, exp_weights: &[f64]) -> Vec<usize> {
        let resampler = self.resampler;
        resampler.resample_indices(exp_weights, self.rng.rng_mut())
    }

    pub(crate) fn dynamics(&self) -> &dyn DynamicsModel {
        self.dynamics.as_ref()
    }

    pub(crate) fn measurement(&self) -> &dyn MeasurementModel {
        self.measurement.as_ref()
    }

    pub(crate) fn process_noise(&self) -> &dyn Distribution {
        self.process_noise.as_ref()
    }

    pub(crate) fn measurement_noise(&self) -> &dyn Distribution {
        self.measurement_noise.as_ref()
    }

    pub(crate) fn rng_mut(&mut self) -> &mut RandomSource {
        &mut self.rng
    }

    pub(crate) fn resampler(&self) -> &SystematicResampler {
        &self.resampler
    }

    fn check_u(&mut self, u: &DVector<f64>) -> Result<()> {
        if self.nu == 0 {
            self.nu = u.len();
        } else if u.len() != self.nu {
            return Err(EstimationError::DimensionMismatch {
                expected: self.nu,
                got: u.len(),
                what: "control input",
            });
        }
        Ok(())
    }

    fn check_y(&self, y: &DVector<f64>) -> Result<()> {
        if y.len() != self.ny {
            return Err(EstimationError::DimensionMismatch {
                expected: self.ny,
                got: y.len(),
                what: "measurement",
            });
        }
        Ok(())
    }
}

impl StateEstimator for ParticleFilter {
    fn predict(&mut self, u: &DVector<f64>) -> Result<()> {
        self.check_u(u)?;
        log::trace!("particle filter predict at t={}", self.t);
        for (i, x) in self.particles.iter().enumerate() {
            let moved = self.dynamics.step(x, u, self.t);
            let noise = self.process_noise.sample(self.rng.rng_mut());
            let next = &moved + noise;
            if !next.iter().all(|v| v.is_finite()) {
                return Err(EstimationError::NonFinite {
                    context: "particle filter dynamics",
                });
            }
            self.scratch[i] = next;
        }
        std::mem::swap(&mut self.particles, &mut self.scratch);
        self.t += 1;
        Ok(())
    }

    fn correct(&mut self, u: &DVector<f64>, y: &DVector<f64>) -> Result<f64> {
        self.check_u(u)?;
        self.check_y(y)?;
        log::trace!("particle filter correct at t={}", self.t);
        let mut delta = DVector::zeros(self.particles.len());
        for (i, x) in self.particles.iter().enumerate() {
            let y_hat = self.measurement.observe(x, u, self.t);
            let resid = y - y_hat;
            delta[i] = self.measurement_noise.logpdf(&resid);
        }
        self.log_weights.add_logweights(&delta);

        let log_n = (self.particles.len() as f64).ln();
        let lse = self.log_weights.normalize()?;
        let delta_ll = lse - log_n;

        let ess = self.log_weights.ess();
        if self.resampler.should_resample(ess, self.particles.len()) {
            log::warn!(
                "ess collapsed to {:.2} at t={} (n={}), resampling",
                ess,
                self.t,
                self.particles.len()
            );
            log::debug!(
                "resampling at t={} (ess={:.2}, n={})",
                self.t,
                ess,
                self.particles.len()
            );
            let exp_w = self.log_weights.expweights();
            let indices = self
                .resampler
                .resample_indices(exp_w.as_slice(), self.rng.rng_mut());
            for (dst, &src) in self.scratch.iter_mut().zip(indices.iter()) {
                dst.copy_from(&self.particles[src]);
            }
            std::mem::swap(&mut self.particles, &mut self.scratch);
            self.log_weights.reset_uniform();
        }

        self.loglik += delta_ll;
        Ok(delta_ll)
    }

    fn state(&self) -> DVector<f64> {
        self.weighted_mean()
    }

    fn covariance(&self) -> DMatrix<f64> {
        self.weighted_cov()
    }

    fn loglik(&self) -> f64 {
        self.loglik
    }

    fn reset(&mut self) -> Result<()> {
        self.rng.reset();
        for p in self.particles.iter_mut() {
            *p = self.init_dist.sample(self.rng.rng_mut());
        }
        self.log_weights.reset_uniform();
        self.loglik = 0.0;
        self.t = 0;
        Ok(())
    }

    fn time(&self) -> u64 {
        self.t
    }

    fn nx(&self) -> usize {
        self.nx
    }

    fn nu(&self) -> usize {
        self.nu
    }

    fn ny(&self) -> usize {
        self.ny
    }
}

pub(crate) fn weighted_mean(particles: &[DVector<f64>], weights: &DVector<f64>) -> DVector<f64> {
    let nx = particles[0].len();
    let mut mean = DVector::zeros(nx);
    for (p, w) in particles.iter().zip(weights.iter()) {
        mean += p * *w;
    }
    mean
}

pub(crate) fn weighted_cov(particles: &[DVector<f64>], weights: &DVector<f64>) -> DMatrix<f64> {
    let nx = particles[0].len();
    let mean = weighted_mean(particles, weights);
    let mut cov = DMatrix::zeros(nx, nx);
    for (p, w) in particles.iter().zip(weights.iter()) {
        let d = p - &mean;
        cov += &d * d.transpose() * *w;
    }
    cov
}
