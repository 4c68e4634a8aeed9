use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// A Gaussian belief over the hidden state: mean and symmetric
/// positive-semi-definite covariance.
///
/// Derives `Serialize`/`Deserialize` so a belief trajectory can be logged or
/// persisted without a bespoke export format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaussianBelief {
    pub mean: DVector<f64>,
    pub cov: DMatrix<f64>,
}

impl GaussianBelief {
    pub fn new(mean: DVector<f64>, cov: DMatrix<f64>) -> Self {
        GaussianBelief { mean, cov }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Re-symmetrize the covariance by averaging with its transpose. Every
    /// Kalman-family update calls this after mutating `cov`, since
    /// accumulated floating point error otherwise drifts it away from
    /// symmetric over many steps.
    pub fn symmetrize(&mut self) {
        let t = self.cov.transpose();
        self.cov = (&self.cov + &t) * 0.5;
    }
}
