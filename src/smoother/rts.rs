use nalgebra::{DMatrix, DVector};

use crate::error::Result;
use crate::filters::{invert_spd_with_fallback, KalmanFilter, StateEstimator};

/// The smoothed mean/covariance sequence produced by the backward RTS pass.
#[derive(Clone, Debug)]
pub struct RtsResult {
    pub smoothed_means: Vec<DVector<f64>>,
    pub smoothed_covs: Vec<DMatrix<f64>>,
}

/// Rauch-Tung-Striebel smoothing: run the forward Kalman pass over `u`/`y`
/// recording the filtered and one-step predicted belief (and the `A` matrix
/// used) at every step, then smooth backward from the final filtered
/// belief.
///
/// `filter` is consumed by the forward pass; pass a fresh filter if you
/// need to run this more than once.
pub fn rts_smooth(
    filter: &mut KalmanFilter,
    u: &[DVector<f64>],
    y: &[DVector<f64>],
) -> Result<RtsResult> {
    let t_len = u.len();
    let mut filtered_means = Vec::with_capacity(t_len);
    let mut filtered_covs = Vec::with_capacity(t_len);
    let mut predicted_means = Vec::with_capacity(t_len);
    let mut predicted_covs = Vec::with_capacity(t_len);
    let mut a_used = Vec::with_capacity(t_len);

    for t in 0..t_len {
        filter.correct(&u[t], &y[t])?;
        filtered_means.push(filter.state());
        filtered_covs.push(filter.covariance());

        let a_t = filter.a_at(filter.time());
        filter.predict(&u[t])?;
        predicted_means.push(filter.state());
        predicted_covs.push(filter.covariance());
        a_used.push(a_t);
    }

    let mut smoothed_means = filtered_means.clone();
    let mut smoothed_covs = filtered_covs.clone();

    for t in (0..t_len.saturating_sub(1)).rev() {
        let (p_pred_inv, _) = invert_spd_with_fallback(&predicted_covs[t])?;
        let gain = &filtered_covs[t] * a_used[t].transpose() * &p_pred_inv;
        let mean_diff = &smoothed_means[t + 1] - &predicted_means[t];
        smoothed_means[t] = &filtered_means[t] + &gain * mean_diff;
        let cov_diff = &smoothed_covs[t + 1] - &predicted_covs[t];
        smoothed_covs[t] = &filtered_covs[t] + &gain * cov_diff * gain.transpose();
    }

    Ok(RtsResult {
        smoothed_means,
        smoothed_covs,
    })
}
