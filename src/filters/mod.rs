//! The four estimator variants sharing one capability set
//! ([`StateEstimator`]): two sequential-Monte-Carlo filters
//! ([`ParticleFilter`], [`AuxiliaryParticleFilter`]), one for models with
//! non-additive noise ([`AdvancedParticleFilter`]), and two Gaussian
//! filters ([`KalmanFilter`], [`UnscentedKalmanFilter`]).
//!
//! Rather than a trait-object hierarchy, each variant is a distinct
//! concrete type implementing [`StateEstimator`]; trajectory drivers and
//! smoothers are generic over the trait bound instead of boxing a common
//! base. [`AuxiliaryParticleFilter`] wraps a [`ParticleFilter`] by
//! composition, not inheritance.

mod advanced;
mod auxiliary;
mod kalman;
mod particle;
mod ukf;

pub use advanced::AdvancedParticleFilter;
pub use auxiliary::AuxiliaryParticleFilter;
pub use kalman::KalmanFilter;
pub use particle::ParticleFilter;
pub use ukf::{UnscentedKalmanFilter, UnscentedParams};

// Re-exported at crate visibility so the smoother module (a sibling of this
// one, not a descendant) can reuse the same weighted-statistics and
// fallback-inversion helpers instead of duplicating them.
pub(crate) use kalman::invert_spd_with_fallback;
pub(crate) use particle::{weighted_cov, weighted_mean};

use nalgebra::{DMatrix, DVector};

use crate::error::Result;

/// The capability set shared by every estimator variant.
pub trait StateEstimator {
    /// Advance the belief through the dynamics model, injecting process
    /// noise, and advance the time index.
    fn predict(&mut self, u: &DVector<f64>) -> Result<()>;

    /// Absorb a measurement into the current belief and return the
    /// incremental log marginal likelihood it contributed.
    fn correct(&mut self, u: &DVector<f64>, y: &DVector<f64>) -> Result<f64>;

    /// Classical filtering convention: correct on the current measurement,
    /// then predict the next state. Returns the correction's incremental
    /// log-likelihood.
    fn step(&mut self, u: &DVector<f64>, y: &DVector<f64>) -> Result<f64> {
        let delta_ll = self.correct(u, y)?;
        self.predict(u)?;
        Ok(delta_ll)
    }

    /// Current best point estimate of the state (the mean).
    fn state(&self) -> DVector<f64>;

    /// Current uncertainty about the state.
    fn covariance(&self) -> DMatrix<f64>;

    /// Cumulative log-likelihood absorbed since construction or the last
    /// [`StateEstimator::reset`].
    fn loglik(&self) -> f64;

    /// Reinitialize the belief from the filter's initial-state
    /// distribution, zero `t` and the cumulative log-likelihood, and
    /// replay the filter's RNG from its original seed.
    fn reset(&mut self) -> Result<()>;

    /// Monotonically increasing time index, advanced only by `predict`.
    fn time(&self) -> u64;

    fn nx(&self) -> usize;
    fn nu(&self) -> usize;
    fn ny(&self) -> usize;
}
