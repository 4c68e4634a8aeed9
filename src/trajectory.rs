//! Driving a [`StateEstimator`] over a full input/observation sequence and
//! collecting its belief history, rather than stepping it by hand.

use nalgebra::{DMatrix, DVector};

use crate::error::Result;
use crate::filters::StateEstimator;
use crate::random::RandomSource;

/// The pre- and post-correction belief sequence produced by running a
/// filter over a trajectory, plus the per-step incremental log-likelihoods.
#[derive(Clone, Debug)]
pub struct TrajectorySolution {
    /// State estimate after each `correct`, one per input step.
    pub filtered_means: Vec<DVector<f64>>,
    pub filtered_covs: Vec<DMatrix<f64>>,
    /// State estimate after the following `predict`, i.e. the one-step-ahead
    /// prediction consumed by the next iteration's `correct`.
    pub predicted_means: Vec<DVector<f64>>,
    pub predicted_covs: Vec<DMatrix<f64>>,
    pub loglik_increments: Vec<f64>,
}

impl TrajectorySolution {
    pub fn total_loglik(&self) -> f64 {
        self.loglik_increments.iter().sum()
    }
}

/// Reset `filter`, then run `filter.step` across paired control/measurement
/// sequences, recording the filtered and predicted belief at every step.
///
/// `u` and `y` must have the same length; `u[t]`/`y[t]` are the control and
/// measurement absorbed at step `t`.
pub fn forward_trajectory(
    filter: &mut dyn StateEstimator,
    u: &[DVector<f64>],
    y: &[DVector<f64>],
) -> Result<TrajectorySolution> {
    assert_eq!(u.len(), y.len(), "control and measurement sequences must have equal length");
    filter.reset()?;
    let t_len = u.len();
    let mut sol = TrajectorySolution {
        filtered_means: Vec::with_capacity(t_len),
        filtered_covs: Vec::with_capacity(t_len),
        predicted_means: Vec::with_capacity(t_len),
        predicted_covs: Vec::with_capacity(t_len),
        loglik_increments: Vec::with_capacity(t_len),
    };
    for t in 0..t_len {
        let delta_ll = filter.correct(&u[t], &y[t])?;
        sol.filtered_means.push(filter.state());
        sol.filtered_covs.push(filter.covariance());
        sol.loglik_increments.push(delta_ll);

        filter.predict(&u[t])?;
        sol.predicted_means.push(filter.state());
        sol.predicted_covs.push(filter.covariance());
    }
    Ok(sol)
}

/// Convenience wrapper returning only the filtered mean trajectory, for
/// callers that don't need the full [`TrajectorySolution`].
pub fn mean_trajectory(
    filter: &mut dyn StateEstimator,
    u: &[DVector<f64>],
    y: &[DVector<f64>],
) -> Result<Vec<DVector<f64>>> {
    Ok(forward_trajectory(filter, u, y)?.filtered_means)
}

/// Simulate a synthetic control/state/measurement trajectory from a
/// ground-truth dynamics/measurement pair, for generating test fixtures and
/// examples rather than for production filtering.
pub fn simulate(
    dynamics: &dyn crate::models::DynamicsModel,
    measurement: &dyn crate::models::MeasurementModel,
    process_noise: &dyn crate::distributions::Distribution,
    measurement_noise: &dyn crate::distributions::Distribution,
    x0: DVector<f64>,
    u: &[DVector<f64>],
    rng: &mut RandomSource,
) -> (Vec<DVector<f64>>, Vec<DVector<f64>>) {
    let mut x = x0;
    let mut xs = Vec::with_capacity(u.len());
    let mut ys = Vec::with_capacity(u.len());
    for (t, ut) in u.iter().enumerate() {
        let y = &measurement.observe(&x, ut, t as u64) + measurement_noise.sample(rng.rng_mut());
        ys.push(y);
        xs.push(x.clone());
        x = &dynamics.step(&x, ut, t as u64) + process_noise.sample(rng.rng_mut());
    }
    (xs, ys)
}
