use nalgebra::{DMatrix, DVector};

use crate::distributions::Categorical;
use crate::error::Result;
use crate::filters::{weighted_cov, weighted_mean, ParticleFilter, StateEstimator};
use crate::random::RandomSource;

/// `M` backward-sampled full-state trajectories plus their empirical
/// mean/covariance at each time step.
#[derive(Clone, Debug)]
pub struct FfbsResult {
    /// `trajectories[m][t]` is the `m`-th smoothed trajectory's state at
    /// time `t`.
    pub trajectories: Vec<Vec<DVector<f64>>>,
    pub smoothed_means: Vec<DVector<f64>>,
    pub smoothed_covs: Vec<DMatrix<f64>>,
}

/// Forward-filtering backward-sampling: run `filter` forward over `u`/`y`
/// recording its particle/weight history, then draw `m` backward-sampled
/// trajectories whose ancestor at each step is chosen in proportion to the
/// filtering weight times the transition density into the trajectory's
/// already-sampled next state.
///
/// `filter` is consumed by the forward pass (its belief ends at the final
/// time step); pass a fresh filter if you need to run this more than once.
pub fn ffbs(
    filter: &mut ParticleFilter,
    u: &[DVector<f64>],
    y: &[DVector<f64>],
    m: usize,
    rng: &mut RandomSource,
) -> Result<FfbsResult> {
    let t_len = u.len();
    let n = filter.num_particles();
    let nx = filter.nx();

    let mut particle_history: Vec<Vec<DVector<f64>>> = Vec::with_capacity(t_len);
    let mut log_weight_history: Vec<Vec<f64>> = Vec::with_capacity(t_len);

    for t in 0..t_len {
        filter.correct(&u[t], &y[t])?;
        particle_history.push(filter.particles().to_vec());
        let exp_w = filter.exp_weights();
        log_weight_history.push(exp_w.iter().map(|w| w.ln()).collect());
        if t + 1 < t_len {
            filter.predict(&u[t])?;
        }
    }

    let mut trajectories: Vec<Vec<DVector<f64>>> =
        (0..m).map(|_| vec![DVector::zeros(nx); t_len]).collect();

    let last = t_len - 1;
    let terminal = Categorical::from_log_weights(&log_weight_history[last]);
    for traj in trajectories.iter_mut() {
        let idx = terminal.sample_index(rng.rng_mut());
        traj[last] = particle_history[last][idx].clone();
    }

    for t in (0..last).rev() {
        let mut backward_log_w = vec![0.0; n];
        for traj in trajectories.iter_mut() {
            let x_next = traj[t + 1].clone();
            for i in 0..n {
                let pred = filter.dynamics().step(&particle_history[t][i], &u[t], t as u64);
                let resid = &x_next - &pred;
                backward_log_w[i] = log_weight_history[t][i] + filter.process_noise().logpdf(&resid);
            }
            let cat = Categorical::from_log_weights(&backward_log_w);
            let idx = cat.sample_index(rng.rng_mut());
            traj[t] = particle_history[t][idx].clone();
        }
    }

    let uniform = DVector::from_element(m, 1.0 / m as f64);
    let mut smoothed_means = Vec::with_capacity(t_len);
    let mut smoothed_covs = Vec::with_capacity(t_len);
    for t in 0..t_len {
        let xs: Vec<DVector<f64>> = trajectories.iter().map(|traj| traj[t].clone()).collect();
        smoothed_means.push(weighted_mean(&xs, &uniform));
        smoothed_covs.push(weighted_cov(&xs, &uniform));
    }

    Ok(FfbsResult {
        trajectories,
        smoothed_means,
        smoothed_covs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::GaussianBelief;
    use crate::distributions::MultivariateNormal;
    use crate::filters::KalmanFilter;
    use crate::resample::SystematicResampler;

    fn setup(seed: u64, n: usize) -> (ParticleFilter, KalmanFilter, Vec<DVector<f64>>, Vec<DVector<f64>>) {
        let a = 0.8;
        let dynamics = move |x: &DVector<f64>, _u: &DVector<f64>, _t: u64| x * a;
        let measurement = |x: &DVector<f64>, _u: &DVector<f64>, _t: u64| x.clone();
        let process_noise =
            MultivariateNormal::new(&DVector::zeros(1), &DMatrix::identity(1, 1)).unwrap();
        let measurement_noise =
            MultivariateNormal::new(&DVector::zeros(1), &DMatrix::identity(1, 1)).unwrap();
        let init = MultivariateNormal::new(&DVector::zeros(1), &DMatrix::from_element(1, 1, 1.0))
            .unwrap();
        let pf = ParticleFilter::new(
            n,
            Box::new(dynamics),
            Box::new(measurement),
            Box::new(process_noise),
            Box::new(measurement_noise),
            Box::new(init),
            SystematicResampler::default(),
            Some(seed),
        )
        .unwrap();

        let a_mat = DMatrix::identity(1, 1) * a;
        let b_mat = DMatrix::identity(1, 1);
        let c_mat = DMatrix::identity(1, 1);
        let d_mat = DMatrix::zeros(1, 1);
        let q = DMatrix::identity(1, 1);
        let r = DMatrix::identity(1, 1);
        let init_belief = GaussianBelief::new(DVector::zeros(1), DMatrix::identity(1, 1));
        let kf = KalmanFilter::new_constant(a_mat, b_mat, c_mat, d_mat, q, r, init_belief).unwrap();

        let u: Vec<DVector<f64>> = (0..8).map(|_| DVector::zeros(1)).collect();
        let y: Vec<DVector<f64>> = (0..8)
            .map(|i| DVector::from_element(1, 0.3 * (i as f64 * 0.5).sin()))
            .collect();
        (pf, kf, u, y)
    }

    #[test]
    fn produces_requested_trajectory_count_and_length() {
        let (mut pf, _kf, u, y) = setup(1, 500);
        let mut rng = RandomSource::from_seed(2);
        let result = ffbs(&mut pf, &u, &y, 50, &mut rng).unwrap();
        assert_eq!(result.trajectories.len(), 50);
        assert_eq!(result.trajectories[0].len(), u.len());
        assert_eq!(result.smoothed_means.len(), u.len());
    }

    #[test]
    fn agrees_with_rts_on_linear_gaussian_system() {
        use crate::smoother::rts::rts_smooth;

        let (mut pf, mut kf, u, y) = setup(9, 5000);
        let mut rng = RandomSource::from_seed(17);
        let ffbs_result = ffbs(&mut pf, &u, &y, 4000, &mut rng).unwrap();
        let rts_result = rts_smooth(&mut kf, &u, &y).unwrap();

        for t in 0..u.len() {
            let diff = (ffbs_result.smoothed_means[t][0] - rts_result.smoothed_means[t][0]).abs();
            assert!(diff < 0.05, "t={t} diff={diff}");
        }
    }
}
