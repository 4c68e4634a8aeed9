use nalgebra::{DMatrix, DVector};

use super::particle::{weighted_cov, weighted_mean};
use super::StateEstimator;
use crate::distributions::Distribution;
use crate::error::{EstimationError, Result};
use crate::models::{MeasurementLikelihoodModel, NoisyDynamicsModel};
use crate::random::RandomSource;
use crate::resample::SystematicResampler;
use crate::weights::WeightVector;

/// A particle filter for models with state-dependent or otherwise
/// non-additive noise: propagation delegates noise injection to the user's
/// `dynamics(x, u, t, rng)`, and correction uses a user-supplied
/// `measurement_likelihood(x, u, y, t)` returning a log-density directly
/// instead of `measurement(..) + logpdf(noise, ..)`.
///
/// Shares the buffer-swap layout and resampling machinery of
/// [`super::ParticleFilter`]; kept as a separate type rather than a
/// generalization of it because its propagation and weighting hooks take a
/// genuinely different shape.
pub struct AdvancedParticleFilter {
    nx: usize,
    nu: usize,
    ny: usize,
    dynamics: Box<dyn NoisyDynamicsModel>,
    likelihood: Box<dyn MeasurementLikelihoodModel>,
    init_dist: Box<dyn Distribution>,
    particles: Vec<DVector<f64>>,
    scratch: Vec<DVector<f64>>,
    log_weights: WeightVector,
    resampler: SystematicResampler,
    rng: RandomSource,
    loglik: f64,
    t: u64,
}

impl AdvancedParticleFilter {
    pub fn new(
        n: usize,
        dynamics: Box<dyn NoisyDynamicsModel>,
        likelihood: Box<dyn MeasurementLikelihoodModel>,
        init_dist: Box<dyn Distribution>,
        ny: usize,
        resampler: SystematicResampler,
        seed: Option<u64>,
    ) -> Result<Self> {
        if n < 1 {
            return Err(EstimationError::InvalidConfiguration(
                "number of particles must be at least 1".to_string(),
            ));
        }
        let nx = init_dist.dim();
        let mut rng = match seed {
            Some(s) => RandomSource::from_seed(s),
            None => RandomSource::from_entropy(),
        };
        let particles: Vec<DVector<f64>> =
            (0..n).map(|_| init_dist.sample(rng.rng_mut())).collect();
        let scratch = particles.clone();
        let log_weights = WeightVector::uniform(n);

        Ok(AdvancedParticleFilter {
            nx,
            nu: 0,
            ny,
            dynamics,
            likelihood,
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

    pub fn weighted_mean(&self) -> DVector<f64> {
        weighted_mean(&self.particles, &self.log_weights.expweights())
    }

    pub fn weighted_cov(&self) -> DMatrix<f64> {
        weighted_cov(&self.particles, &self.log_weights.expweights())
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

impl StateEstimator for AdvancedParticleFilter {
    fn predict(&mut self, u: &DVector<f64>) -> Result<()> {
        self.check_u(u)?;
        log::trace!("advanced particle filter predict at t={}", self.t);
        for i in 0..self.particles.len() {
            let next = self
                .dynamics
                .sample_step(&self.particles[i], u, self.t, self.rng.rng_mut());
            if !next.iter().all(|v| v.is_finite()) {
                return Err(EstimationError::NonFinite {
                    context: "advanced particle filter dynamics",
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
        log::trace!("advanced particle filter correct at t={}", self.t);
        let mut delta = DVector::zeros(self.particles.len());
        for (i, x) in self.particles.iter().enumerate() {
            delta[i] = self.likelihood.log_likelihood(x, u, y, self.t);
        }
        self.log_weights.add_logweights(&delta);

        let log_n = (self.particles.len() as f64).ln();
        let lse = self.log_weights.normalize()?;
        let delta_ll = lse - log_n;

        let ess = self.log_weights.ess();
        if self.resampler.should_resample(ess, self.particles.len()) {
            log::debug!("resampling at t={} (ess={:.2})", self.t, ess);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::MultivariateNormal;
    use rand_distr::{Distribution as _, StandardNormal};

    /// S3: a classic strongly-nonlinear univariate growth model.
    fn growth_model_filter(n: usize, seed: u64) -> AdvancedParticleFilter {
        let dynamics = |x: &DVector<f64>, _u: &DVector<f64>, t: u64, rng: &mut dyn rand::RngCore| {
            let xv = x[0];
            let tt = t as f64;
            let mean = 0.5 * xv + 25.0 * xv / (1.0 + xv * xv) + 8.0 * (1.2 * tt).cos();
            let noise: f64 = StandardNormal.sample(rng);
            DVector::from_element(1, mean + noise)
        };
        let likelihood = |x: &DVector<f64>, _u: &DVector<f64>, y: &DVector<f64>, _t: u64| {
            let pred = x[0] * x[0] / 20.0;
            let resid = y[0] - pred;
            -0.5 * (resid * resid + (2.0 * std::f64::consts::PI).ln())
        };
        let init_dist =
            MultivariateNormal::new(&DVector::zeros(1), &DMatrix::from_element(1, 1, 2.0))
                .unwrap();
        AdvancedParticleFilter::new(
            n,
            Box::new(dynamics),
            Box::new(likelihood),
            Box::new(init_dist),
            1,
            SystematicResampler::default(),
            Some(seed),
        )
        .unwrap()
    }

    #[test]
    fn s3_rmse_below_threshold() {
        let n = 1000;
        let t_len = 30usize;
        let mut truth_rng = RandomSource::from_seed(7);
        let mut x = 0.1f64;
        let mut xs = Vec::with_capacity(t_len);
        let mut ys = Vec::with_capacity(t_len);
        for t in 0..t_len {
            let noise: f64 = StandardNormal.sample(truth_rng.rng_mut());
            x = 0.5 * x + 25.0 * x / (1.0 + x * x) + 8.0 * (1.2 * t as f64).cos() + noise;
            let obs_noise: f64 = StandardNormal.sample(truth_rng.rng_mut());
            let y = x * x / 20.0 + obs_noise;
            xs.push(x);
            ys.push(y);
        }

        let mut pf = growth_model_filter(n, 55);
        let u = DVector::zeros(0);
        let mut sq_err = 0.0;
        for t in 0..t_len {
            let y = DVector::from_element(1, ys[t]);
            pf.correct(&u, &y).unwrap();
            let mean = pf.weighted_mean()[0];
            sq_err += (mean - xs[t]).powi(2);
            pf.predict(&u).unwrap();
        }
        let rmse = (sq_err / t_len as f64).sqrt();
        assert!(rmse < 3.0, "rmse was {rmse}");
    }
}
