//! Sampling and log-density over the small set of distributions the
//! estimator engine needs: multivariate and univariate Gaussians, a
//! discrete categorical, and a heterogeneous product of univariate
//! distributions.

mod categorical;
mod gaussian;
mod product;

pub use categorical::Categorical;
pub use gaussian::{MultivariateNormal, UnivariateNormal};
pub use product::TupleProduct;

use nalgebra::DVector;
use rand::RngCore;

/// A distribution over `DVector<f64>`, dispatched dynamically so filters can
/// hold a boxed noise distribution without committing to a concrete type.
pub trait Distribution: Send + Sync {
    /// Dimensionality of a draw from this distribution.
    fn dim(&self) -> usize;

    /// Draw a sample using the supplied random source.
    fn sample(&self, rng: &mut dyn RngCore) -> DVector<f64>;

    /// Log-density of `x` under this distribution. `-inf` for impossible
    /// values; never NaN for finite, in-support input.
    fn logpdf(&self, x: &DVector<f64>) -> f64;

    /// Density of `x`, exponentiated from [`Distribution::logpdf`].
    fn pdf(&self, x: &DVector<f64>) -> f64 {
        self.logpdf(x).exp()
    }
}

/// A distribution over a single real value, used as the building block for
/// [`TupleProduct`].
pub trait UnivariateDistribution: Send + Sync {
    fn sample(&self, rng: &mut dyn RngCore) -> f64;
    fn logpdf(&self, x: f64) -> f64;
}
