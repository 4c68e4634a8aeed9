use nalgebra::{DMatrix, DVector};

use super::particle::{weighted_cov, weighted_mean};
use super::{ParticleFilter, StateEstimator};
use crate::error::{EstimationError, Result};
use crate::models::DynamicsModel;
use crate::weights::WeightVector;

/// Auxiliary particle filter (Pitt & Shephard): reduces weight-degeneracy
/// variance versus the bootstrap filter by resampling on a look-ahead
/// weight that uses the incoming measurement before propagating particles.
///
/// Wraps a [`ParticleFilter`] by composition and reuses its dynamics,
/// measurement, and noise models rather than duplicating them.
///
/// The auxiliary resample/propagate/reweight sequence needs the
/// measurement `y` to compute its look-ahead weight, so unlike the plain
/// particle filter it cannot split cleanly into a `predict` that only sees
/// `u`: all of the real work happens in [`StateEstimator::correct`], and
/// `predict` is a no-op kept only so this type satisfies the shared
/// [`StateEstimator`] contract.
pub struct AuxiliaryParticleFilter {
    inner: ParticleFilter,
    one_step_predictor: Option<Box<dyn DynamicsModel>>,
}

impl AuxiliaryParticleFilter {
    pub fn new(inner: ParticleFilter) -> Self {
        AuxiliaryParticleFilter {
            inner,
            one_step_predictor: None,
        }
    }

    /// Override the deterministic one-step predictor `mu` used for the
    /// look-ahead weight. Defaults to the wrapped filter's noiseless
    /// dynamics.
    pub fn with_predictor(mut self, predictor: Box<dyn DynamicsModel>) -> Self {
        self.one_step_predictor = Some(predictor);
        self
    }

    pub fn inner(&self) -> &ParticleFilter {
        &self.inner
    }

    pub fn particles(&self) -> &[DVector<f64>] {
        self.inner.particles()
    }

    pub fn log_weights(&self) -> &WeightVector {
        self.inner.log_weights()
    }

    pub fn weighted_mean(&self) -> DVector<f64> {
        self.inner.weighted_mean()
    }

    pub fn weighted_cov(&self) -> DMatrix<f64> {
        self.inner.weighted_cov()
    }

    pub fn num_particles(&self) -> usize {
        self.inner.num_particles()
    }
}

impl StateEstimator for AuxiliaryParticleFilter {
    fn predict(&mut self, _u: &DVector<f64>) -> Result<()> {
        Ok(())
    }

    fn correct(&mut self, u: &DVector<f64>, y: &DVector<f64>) -> Result<f64> {
        let n = self.inner.num_particles();
        let t = self.inner.time();

        // Look-ahead weight alpha_i = logpdf(dg, y - measurement(mu(x_i), u, t)).
        let mut alpha = DVector::zeros(n);
        for (i, x) in self.inner.particles().iter().enumerate() {
            let mu_x = match &self.one_step_predictor {
                Some(p) => p.step(x, u, t),
                None => self.inner.dynamics().step(x, u, t),
            };
            let y_hat = self.inner.measurement().observe(&mu_x, u, t);
            let resid = y - y_hat;
            alpha[i] = self.inner.measurement_noise().logpdf(&resid);
        }

        let combined = self.inner.log_weights().log_weights() + &alpha;
        let combined_weights = WeightVector::from_log_weights(combined);
        let exp_combined = combined_weights.expweights();
        let parent_indices = self.inner.resample_with(exp_combined.as_slice());

        // Propagate the chosen parents through the noisy dynamics into a
        // freshly built particle set (the resample already touches every
        // slot, so there is no steady-state allocation to protect here the
        // way there is in the plain bootstrap filter).
        let mut next_particles = Vec::with_capacity(n);
        for &parent in &parent_indices {
            let parent_state = self.inner.particles()[parent].clone();
            let moved = self.inner.dynamics().step(&parent_state, u, t);
            let noise = self.inner.sample_process_noise();
            let next = &moved + noise;
            if !next.iter().all(|v| v.is_finite()) {
                return Err(EstimationError::NonFinite {
                    context: "auxiliary particle filter dynamics",
                });
            }
            next_particles.push(next);
        }
        self.inner.replace_particles(next_particles);

        // Final reweight: logpdf(dg, y - y_hat_i) - alpha_parent(i).
        let mut final_log_w = DVector::zeros(n);
        for (i, &parent) in parent_indices.iter().enumerate() {
            let x = &self.inner.particles()[i];
            let y_hat = self.inner.measurement().observe(x, u, t);
            let resid = y - y_hat;
            final_log_w[i] = self.inner.measurement_noise().logpdf(&resid) - alpha[parent];
        }
        *self.inner.log_weights_mut() = WeightVector::from_log_weights(final_log_w);

        let log_n = (n as f64).ln();
        let lse = self.inner.log_weights_mut().normalize()?;
        let delta_ll = lse - log_n;
        self.inner.add_loglik(delta_ll);
        self.inner.set_t(t + 1);
        Ok(delta_ll)
    }

    fn state(&self) -> DVector<f64> {
        weighted_mean(self.inner.particles(), &self.inner.log_weights().expweights())
    }

    fn covariance(&self) -> DMatrix<f64> {
        weighted_cov(self.inner.particles(), &self.inner.log_weights().expweights())
    }

    fn loglik(&self) -> f64 {
        self.inner.loglik()
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }

    fn time(&self) -> u64 {
        self.inner.time()
    }

    fn nx(&self) -> usize {
        self.inner.nx()
    }

    fn nu(&self) -> usize {
        self.inner.nu()
    }

    fn ny(&self) -> usize {
        self.inner.ny()
    }
}
