use rand::{Rng, RngCore};

use crate::error::{EstimationError, Result};

/// Low-variance systematic resampling, gated on effective sample size.
///
/// Draws a single uniform `u ~ U(0, 1/n)` and walks the cumulative
/// normalized weights once, which is why this scheme has much lower
/// variance than drawing `n` independent uniforms (plain multinomial
/// resampling).
#[derive(Clone, Copy, Debug)]
pub struct SystematicResampler {
    threshold: f64,
}

impl SystematicResampler {
    pub fn new(threshold: f64) -> Result<Self> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(EstimationError::InvalidConfiguration(format!(
                "resampling threshold must be in (0, 1], got {threshold}"
            )));
        }
        Ok(SystematicResampler { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether resampling should trigger given the current ESS out of `n`
    /// particles.
    pub fn should_resample(&self, ess: f64, n: usize) -> bool {
        ess < self.threshold * n as f64
    }

    /// Produce the index permutation-with-repetition implied by the
    /// (normalized) weights, assumed to sum to one in probability space.
    pub fn resample_indices(&self, exp_weights: &[f64], rng: &mut dyn RngCore) -> Vec<usize> {
        systematic_indices(exp_weights, rng)
    }
}

impl Default for SystematicResampler {
    fn default() -> Self {
        SystematicResampler::new(0.5).expect("0.5 is a valid threshold")
    }
}

/// Systematic resampling on normalized weights: draws `u ~ U(0, 1/n)` and,
/// for `k = 0..n`, emits the index `i` where the inclusive cumulative weight
/// `Σ weights[0..=i]` first reaches `u + k/n`.
pub fn systematic_indices(weights: &[f64], rng: &mut dyn RngCore) -> Vec<usize> {
    let n = weights.len();
    let u0: f64 = rng.gen::<f64>() / n as f64;
    systematic_indices_from_offset(weights, u0)
}

/// Core walk shared by [`systematic_indices`] and its tests: given the
/// initial offset `u0` (normally drawn from `U(0, 1/n)`), emits the index
/// permutation for `k = 0..n`.
fn systematic_indices_from_offset(weights: &[f64], u0: f64) -> Vec<usize> {
    let n = weights.len();
    let mut indices = Vec::with_capacity(n);
    let mut cumulative = weights[0];
    let mut i = 0;
    for k in 0..n {
        let target = u0 + k as f64 / n as f64;
        while cumulative < target && i < n - 1 {
            i += 1;
            cumulative += weights[i];
        }
        indices.push(i);
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::RandomSource;

    #[test]
    fn rejects_bad_threshold() {
        assert!(SystematicResampler::new(0.0).is_err());
        assert!(SystematicResampler::new(1.5).is_err());
        assert!(SystematicResampler::new(0.5).is_ok());
    }

    #[test]
    fn s4_known_indices() {
        // Deterministic systematic draw with u fixed at 0.1, matching the
        // worked scenario: weights [0.1, 0.1, 0.1, 0.7], n=4, u=0.1.
        let weights = [0.1, 0.1, 0.1, 0.7];
        let indices = systematic_indices_from_offset(&weights, 0.1);
        assert_eq!(indices, vec![0, 3, 3, 3]);
    }

    #[test]
    fn resample_preserves_count() {
        let weights = [0.25, 0.25, 0.25, 0.25];
        let mut src = RandomSource::from_seed(5);
        let indices = systematic_indices(&weights, src.rng_mut());
        assert_eq!(indices.len(), 4);
        for idx in indices {
            assert!(idx < 4);
        }
    }

    #[test]
    fn unbiasedness_in_expectation() {
        // Expected copies of particle i should equal n * w_i; check with a
        // large number of repeated systematic draws using fresh random
        // offsets each trial.
        let weights = [0.5, 0.3, 0.2];
        let n = weights.len();
        let trials = 20_000;
        let mut counts = vec![0usize; n];
        let mut src = RandomSource::from_seed(123);
        for _ in 0..trials {
            let indices = systematic_indices(&weights, src.rng_mut());
            for idx in indices {
                counts[idx] += 1;
            }
        }
        for i in 0..n {
            let empirical = counts[i] as f64 / (trials * n) as f64;
            assert!((empirical - weights[i]).abs() < 0.01);
        }
    }
}
