use nalgebra::{Cholesky, DMatrix, DVector};
use std::f64::consts::PI;

use super::kalman::invert_spd_with_fallback;
use super::StateEstimator;
use crate::belief::GaussianBelief;
use crate::error::{EstimationError, Result};
use crate::models::{DynamicsModel, MeasurementModel};

/// Parameters of the symmetric scaled unscented transform.
#[derive(Clone, Copy, Debug)]
pub struct UnscentedParams {
    pub alpha: f64,
    pub beta: f64,
    pub kappa: f64,
}

impl Default for UnscentedParams {
    fn default() -> Self {
        UnscentedParams {
            alpha: 1e-3,
            beta: 2.0,
            kappa: 0.0,
        }
    }
}

/// The unscented Kalman filter: propagates `2*nx + 1` deterministically
/// chosen sigma points through the nonlinear dynamics/measurement instead
/// of linearizing them, then recomposes mean and covariance from the
/// standard unscented weight sets.
pub struct UnscentedKalmanFilter {
    dynamics: Box<dyn DynamicsModel>,
    measurement: Box<dyn MeasurementModel>,
    q: DMatrix<f64>,
    r_meas: DMatrix<f64>,
    belief: GaussianBelief,
    init_belief: GaussianBelief,
    params: UnscentedParams,
    lambda: f64,
    mean_weights: Vec<f64>,
    cov_weights: Vec<f64>,
    sigma_points: Vec<DVector<f64>>,
    propagated: Vec<DVector<f64>>,
    loglik: f64,
    t: u64,
    nu: usize,
    ny: usize,
}

impl UnscentedKalmanFilter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dynamics: Box<dyn DynamicsModel>,
        measurement: Box<dyn MeasurementModel>,
        q: DMatrix<f64>,
        r_meas: DMatrix<f64>,
        init_belief: GaussianBelief,
        params: UnscentedParams,
        nu: usize,
        ny: usize,
    ) -> Result<Self> {
        let nx = init_belief.dim();
        if q.nrows() != nx || q.ncols() != nx {
            return Err(EstimationError::InvalidConfiguration(format!(
                "process noise covariance must be {nx}x{nx}"
            )));
        }
        let lambda = params.alpha * params.alpha * (nx as f64 + params.kappa) - nx as f64;
        let (mean_weights, cov_weights) = unscented_weights(nx, lambda, params);
        let n_sigma = 2 * nx + 1;
        Ok(UnscentedKalmanFilter {
            dynamics,
            measurement,
            q,
            r_meas,
            belief: init_belief.clone(),
            init_belief,
            params,
            lambda,
            mean_weights,
            cov_weights,
            sigma_points: vec![DVector::zeros(nx); n_sigma],
            propagated: vec![DVector::zeros(nx); n_sigma],
            loglik: 0.0,
            t: 0,
            nu,
            ny,
        })
    }

    pub fn belief(&self) -> &GaussianBelief {
        &self.belief
    }

    fn check_u(&self, u: &DVector<f64>) -> Result<()> {
        if u.len() != self.nu {
            return Err(EstimationError::DimensionMismatch {
                expected: self.nu,
                got: u.len(),
                what: "control input",
            });
        }
        Ok(())
    }

    fn check_y(&self, y: &DVector<f64>) -> Result<()> {
        if y.len() != self.ny {
            return Err(EstimationError::DimensionMismatch {
                expected: self.ny,
                got: y.len(),
                what: "measurement",
            });
        }
        Ok(())
    }

    /// Fill `self.sigma_points` from the current belief, retrying once with
    /// jitter added to the covariance if its Cholesky factor fails.
    fn generate_sigma_points(&mut self) -> Result<()> {
        let nx = self.belief.dim();
        let scale = (nx as f64 + self.lambda).max(0.0).sqrt();
        let chol = match Cholesky::new(self.belief.cov.clone()) {
            Some(c) => c,
            None => {
                let trace = self.belief.cov.trace();
                let eps = 1e-8 * trace / nx as f64;
                log::warn!("belief covariance not positive definite, retrying with jitter {eps:e}");
                let jittered = &self.belief.cov + DMatrix::identity(nx, nx) * eps;
                Cholesky::new(jittered).ok_or(EstimationError::SingularInnovation)?
            }
        };
        let l = chol.l();
        self.sigma_points[0] = self.belief.mean.clone();
        for i in 0..nx {
            let col = l.column(i) * scale;
            self.sigma_points[i + 1] = &self.belief.mean + &col;
            self.sigma_points[nx + i + 1] = &self.belief.mean - &col;
        }
        Ok(())
    }
}

impl StateEstimator for UnscentedKalmanFilter {
    fn predict(&mut self, u: &DVector<f64>) -> Result<()> {
        self.check_u(u)?;
        log::trace!("ukf predict at t={}", self.t);
        self.generate_sigma_points()?;
        for i in 0..self.sigma_points.len() {
            self.propagated[i] = self.dynamics.step(&self.sigma_points[i], u, self.t);
        }
        let nx = self.belief.dim();
        let mut mean = DVector::zeros(nx);
        for (w, p) in self.mean_weights.iter().zip(self.propagated.iter()) {
            mean += p * *w;
        }
        let mut cov = self.q.clone();
        for (w, p) in self.cov_weights.iter().zip(self.propagated.iter()) {
            let d = p - &mean;
            cov += &d * d.transpose() * *w;
        }
        if !mean.iter().all(|v| v.is_finite()) {
            return Err(EstimationError::NonFinite {
                context: "ukf predict",
            });
        }
        self.belief.mean = mean;
        self.belief.cov = cov;
        self.belief.symmetrize();
        self.t += 1;
        Ok(())
    }

    fn correct(&mut self, u: &DVector<f64>, y: &DVector<f64>) -> Result<f64> {
        self.check_u(u)?;
        self.check_y(y)?;
        log::trace!("ukf correct at t={}", self.t);
        self.generate_sigma_points()?;

        let ny = self.ny;
        let nx = self.belief.dim();
        let y_sigma: Vec<DVector<f64>> = self
            .sigma_points
            .iter()
            .map(|x| self.measurement.observe(x, u, self.t))
            .collect();

        let mut y_mean = DVector::zeros(ny);
        for (w, ys) in self.mean_weights.iter().zip(y_sigma.iter()) {
            y_mean += ys * *w;
        }

        let mut p_yy = self.r_meas.clone();
        let mut p_xy = DMatrix::zeros(nx, ny);
        for i in 0..self.sigma_points.len() {
            let dy = &y_sigma[i] - &y_mean;
            let dx = &self.sigma_points[i] - &self.belief.mean;
            let w = self.cov_weights[i];
            p_yy += &dy * dy.transpose() * w;
            p_xy += &dx * dy.transpose() * w;
        }

        let (p_yy_inv, log_det) = invert_spd_with_fallback(&p_yy)?;
        let k = &p_xy * &p_yy_inv;
        let innovation = y - &y_mean;
        self.belief.mean += &k * &innovation;
        self.belief.cov -= &k * &p_yy * k.transpose();
        self.belief.symmetrize();

        let quad = (innovation.transpose() * &p_yy_inv * &innovation)[(0, 0)];
        let delta_ll = -0.5 * (ny as f64 * (2.0 * PI).ln() + log_det + quad);
        self.loglik += delta_ll;
        Ok(delta_ll)
    }

    fn state(&self) -> DVector<f64> {
        self.belief.mean.clone()
    }

    fn covariance(&self) -> DMatrix<f64> {
        self.belief.cov.clone()
    }

    fn loglik(&self) -> f64 {
        self.loglik
    }

    fn reset(&mut self) -> Result<()> {
        self.belief = self.init_belief.clone();
        self.loglik = 0.0;
        self.t = 0;
        Ok(())
    }

    fn time(&self) -> u64 {
        self.t
    }

    fn nx(&self) -> usize {
        self.belief.dim()
    }

    fn nu(&self) -> usize {
        self.nu
    }

    fn ny(&self) -> usize {
        self.ny
    }
}

fn unscented_weights(nx: usize, lambda: f64, params: UnscentedParams) -> (Vec<f64>, Vec<f64>) {
    let n_sigma = 2 * nx + 1;
    let mut wm = vec![0.0; n_sigma];
    let mut wc = vec![0.0; n_sigma];
    wm[0] = lambda / (nx as f64 + lambda);
    wc[0] = wm[0] + (1.0 - params.alpha * params.alpha + params.beta);
    let w = 1.0 / (2.0 * (nx as f64 + lambda));
    for item in wm.iter_mut().skip(1) {
        *item = w;
    }
    for item in wc.iter_mut().skip(1) {
        *item = w;
    }
    (wm, wc)
}
