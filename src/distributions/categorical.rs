use nalgebra::DVector;
use rand::{Rng, RngCore};

use super::Distribution;

/// Discrete distribution over `{0, ..., k-1}` built from log-weights.
///
/// Used directly by the FFBS smoother to draw a terminal particle index from
/// the weights at `t = T`, and to draw an ancestor index from the backward
/// weights at each smoothing step.
#[derive(Clone, Debug)]
pub struct Categorical {
    log_probs: Vec<f64>,
}

impl Categorical {
    /// Build from raw log-weights (need not be normalized).
    pub fn from_log_weights(log_weights: &[f64]) -> Self {
        let max = log_weights
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = log_weights.iter().map(|w| (w - max).exp()).sum();
        let log_norm = max + sum.ln();
        let log_probs = log_weights.iter().map(|w| w - log_norm).collect();
        Categorical { log_probs }
    }

    pub fn len(&self) -> usize {
        self.log_probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_probs.is_empty()
    }

    pub fn log_prob(&self, index: usize) -> f64 {
        self.log_probs[index]
    }

    /// Draw one index, in proportion to the (normalized) probabilities.
    pub fn sample_index(&self, rng: &mut dyn RngCore) -> usize {
        let u: f64 = rng.gen();
        let mut cum = 0.0;
        for (i, lp) in self.log_probs.iter().enumerate() {
            cum += lp.exp();
            if u <= cum {
                return i;
            }
        }
        self.log_probs.len() - 1
    }
}

impl Distribution for Categorical {
    fn dim(&self) -> usize {
        1
    }

    fn sample(&self, rng: &mut dyn RngCore) -> DVector<f64> {
        DVector::from_element(1, self.sample_index(rng) as f64)
    }

    fn logpdf(&self, x: &DVector<f64>) -> f64 {
        let idx = x[0].round();
        if idx < 0.0 || idx as usize >= self.log_probs.len() {
            return f64::NEG_INFINITY;
        }
        self.log_probs[idx as usize]
    }
}
