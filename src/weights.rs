use nalgebra::DVector;

use crate::error::{EstimationError, Result};

/// Log-space particle weights with numerically stable normalization and
/// effective-sample-size tracking.
///
/// Every `logsumexp` in this module subtracts the running maximum before
/// exponentiating, so a batch of very negative (or one very dominant)
/// log-weights never overflows or underflows silently.
#[derive(Clone, Debug)]
pub struct WeightVector {
    log_w: DVector<f64>,
}

impl WeightVector {
    /// Uniform weights summing to one in probability space (`-ln n` each).
    pub fn uniform(n: usize) -> Self {
        let log_n = (n as f64).ln();
        WeightVector {
            log_w: DVector::from_element(n, -log_n),
        }
    }

    pub fn from_log_weights(log_w: DVector<f64>) -> Self {
        WeightVector { log_w }
    }

    pub fn len(&self) -> usize {
        self.log_w.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_w.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        self.log_w.as_slice()
    }

    pub fn log_weights(&self) -> &DVector<f64> {
        &self.log_w
    }

    /// Add a pointwise log-density contribution to every weight.
    pub fn add_logweights(&mut self, delta: &DVector<f64>) {
        self.log_w += delta;
    }

    /// Numerically stable `ln(sum(exp(w)))`.
    pub fn logsumexp(&self) -> f64 {
        logsumexp(self.log_w.as_slice())
    }

    /// Subtract `logsumexp` in place so `logsumexp() == 0` afterwards.
    /// Returns the pre-normalization `logsumexp`, which is the step's
    /// incremental log marginal likelihood.
    pub fn normalize(&mut self) -> Result<f64> {
        let lse = self.logsumexp();
        if !lse.is_finite() {
            return Err(EstimationError::DegenerateWeights);
        }
        self.log_w.apply(|w| *w -= lse);
        if self.log_w.iter().any(|w| w.is_nan()) {
            return Err(EstimationError::DegenerateWeights);
        }
        Ok(lse)
    }

    /// Effective sample size on normalized weights: `1 / sum(exp(w)^2)`.
    /// Bounded `1 <= ESS <= N`; `N` iff uniform, `1` iff degenerate to one
    /// particle.
    pub fn ess(&self) -> f64 {
        let sum_sq: f64 = self.log_w.iter().map(|w| (2.0 * w).exp()).sum();
        1.0 / sum_sq
    }

    /// Materialize `exp(w_i)` as a transient vector.
    pub fn expweights(&self) -> DVector<f64> {
        self.log_w.map(|w| w.exp())
    }

    pub fn reset_uniform(&mut self) {
        let n = self.log_w.len();
        let log_n = (n as f64).ln();
        self.log_w.fill(-log_n);
    }
}

/// Numerically stable `ln(sum(exp(values)))`.
pub fn logsumexp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn normalize_yields_zero_logsumexp() {
        let mut w = WeightVector::from_log_weights(DVector::from_vec(vec![1.0, 2.0, 0.5]));
        w.normalize().unwrap();
        assert_relative_eq!(w.logsumexp(), 0.0, epsilon = 1e-10);
        assert_relative_eq!(w.expweights().sum(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn uniform_weights_have_ess_n() {
        let w = WeightVector::uniform(10);
        assert_relative_eq!(w.ess(), 10.0, epsilon = 1e-10);
    }

    #[test]
    fn degenerate_weights_have_ess_one() {
        let mut log_w = DVector::from_element(5, f64::NEG_INFINITY);
        log_w[0] = 0.0;
        let mut w = WeightVector::from_log_weights(log_w);
        w.normalize().unwrap();
        assert_relative_eq!(w.ess(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn all_neg_infinity_is_degenerate() {
        let mut w = WeightVector::from_log_weights(DVector::from_element(4, f64::NEG_INFINITY));
        assert_eq!(
            w.normalize().unwrap_err(),
            EstimationError::DegenerateWeights
        );
    }

    #[test]
    fn ess_bounds_hold_for_arbitrary_weights() {
        let w = WeightVector::from_log_weights(DVector::from_vec(vec![0.1, -0.4, 0.2, -2.0]));
        let mut w = w;
        w.normalize().unwrap();
        assert!(w.ess() >= 1.0 - 1e-9);
        assert!(w.ess() <= w.len() as f64 + 1e-9);
    }
}
