use nalgebra::{Cholesky, DMatrix, DVector};
use rand::RngCore;
use rand_distr::{Distribution as _, StandardNormal};
use std::f64::consts::PI;

use super::Distribution;
use crate::error::{EstimationError, Result};

/// Multivariate Gaussian `N(mean, cov)`.
///
/// `cov` may be diagonal or full; both are stored densely and factored once
/// at construction via a Cholesky decomposition, matching the teacher's
/// `MultiVariateNormal::new(mean, cov)` convention of failing fast on a
/// non-positive-definite covariance rather than deferring the error to the
/// first `sample`/`pdf` call.
#[derive(Clone, Debug)]
pub struct MultivariateNormal {
    mean: DVector<f64>,
    cov: DMatrix<f64>,
    chol_l: DMatrix<f64>,
    log_det: f64,
}

impl MultivariateNormal {
    pub fn new(mean: &DVector<f64>, cov: &DMatrix<f64>) -> Result<Self> {
        let n = mean.len();
        if cov.nrows() != n || cov.ncols() != n {
            return Err(EstimationError::DimensionMismatch {
                expected: n,
                got: cov.nrows(),
                what: "MultivariateNormal covariance",
            });
        }
        let chol = Cholesky::new(cov.clone()).ok_or_else(|| {
            EstimationError::InvalidConfiguration(
                "covariance is not positive definite".to_string(),
            )
        })?;
        let l = chol.l();
        let log_det = 2.0 * l.diagonal().iter().map(|d| d.ln()).sum::<f64>();
        Ok(MultivariateNormal {
            mean: mean.clone(),
            cov: cov.clone(),
            chol_l: l,
            log_det,
        })
    }

    /// Convenience constructor for a diagonal covariance given as variances.
    pub fn diagonal(mean: &DVector<f64>, variances: &DVector<f64>) -> Result<Self> {
        let n = mean.len();
        let cov = DMatrix::from_diagonal(variances);
        if variances.len() != n {
            return Err(EstimationError::DimensionMismatch {
                expected: n,
                got: variances.len(),
                what: "MultivariateNormal diagonal variances",
            });
        }
        Self::new(mean, &cov)
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    pub fn cov(&self) -> &DMatrix<f64> {
        &self.cov
    }
}

impl Distribution for MultivariateNormal {
    fn dim(&self) -> usize {
        self.mean.len()
    }

    fn sample(&self, rng: &mut dyn RngCore) -> DVector<f64> {
        let z = DVector::from_fn(self.mean.len(), |_, _| StandardNormal.sample(rng));
        &self.mean + &self.chol_l * z
    }

    fn logpdf(&self, x: &DVector<f64>) -> f64 {
        let k = self.mean.len() as f64;
        let diff = x - &self.mean;
        let y = self.chol_l.solve_lower_triangular(&diff).expect(
            "Cholesky factor of a positive-definite matrix is always lower-triangular-solvable",
        );
        let quad = y.dot(&y);
        -0.5 * (k * (2.0 * PI).ln() + self.log_det + quad)
    }
}

/// Univariate Gaussian `N(mean, variance)`, used both standalone and as a
/// component of [`super::TupleProduct`].
#[derive(Clone, Copy, Debug)]
pub struct UnivariateNormal {
    mean: f64,
    variance: f64,
}

impl UnivariateNormal {
    pub fn new(mean: f64, variance: f64) -> Result<Self> {
        if !(variance > 0.0) {
            return Err(EstimationError::InvalidConfiguration(format!(
                "variance must be positive, got {variance}"
            )));
        }
        Ok(UnivariateNormal { mean, variance })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }
}

impl super::UnivariateDistribution for UnivariateNormal {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        let z: f64 = StandardNormal.sample(rng);
        self.mean + self.variance.sqrt() * z
    }

    fn logpdf(&self, x: f64) -> f64 {
        let diff = x - self.mean;
        -0.5 * ((2.0 * PI * self.variance).ln() + diff * diff / self.variance)
    }
}

impl Distribution for UnivariateNormal {
    fn dim(&self) -> usize {
        1
    }

    fn sample(&self, rng: &mut dyn RngCore) -> DVector<f64> {
        DVector::from_element(1, super::UnivariateDistribution::sample(self, rng))
    }

    fn logpdf(&self, x: &DVector<f64>) -> f64 {
        super::UnivariateDistribution::logpdf(self, x[0])
    }
}
