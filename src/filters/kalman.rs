use nalgebra::{Cholesky, DMatrix, DVector, LU};
use std::f64::consts::PI;

use super::StateEstimator;
use crate::belief::GaussianBelief;
use crate::error::{EstimationError, Result};

type TimeVaryingMatrix = Box<dyn Fn(u64) -> DMatrix<f64> + Send + Sync>;

/// The standard (linear-Gaussian) Kalman filter.
///
/// `A`, `B`, `C` may be time-varying: pass a closure that reads `t` and
/// returns the matrix for that step. The constant case is just a closure
/// that ignores `t`, so both share one field type instead of an enum.
pub struct KalmanFilter {
    a: TimeVaryingMatrix,
    b: TimeVaryingMatrix,
    c: TimeVaryingMatrix,
    d: TimeVaryingMatrix,
    q: DMatrix<f64>,
    r_meas: DMatrix<f64>,
    belief: GaussianBelief,
    init_belief: GaussianBelief,
    loglik: f64,
    t: u64,
    nu: usize,
    ny: usize,
}

impl KalmanFilter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        a: TimeVaryingMatrix,
        b: TimeVaryingMatrix,
        c: TimeVaryingMatrix,
        d: TimeVaryingMatrix,
        q: DMatrix<f64>,
        r_meas: DMatrix<f64>,
        init_belief: GaussianBelief,
        nu: usize,
        ny: usize,
    ) -> Result<Self> {
        let nx = init_belief.dim();
        if q.nrows() != nx || q.ncols() != nx {
            return Err(EstimationError::InvalidConfiguration(format!(
                "process noise covariance must be {nx}x{nx}"
            )));
        }
        if r_meas.nrows() != ny || r_meas.ncols() != ny {
            return Err(EstimationError::InvalidConfiguration(format!(
                "measurement noise covariance must be {ny}x{ny}"
            )));
        }
        Ok(KalmanFilter {
            a,
            b,
            c,
            d,
            q,
            r_meas,
            belief: init_belief.clone(),
            init_belief,
            loglik: 0.0,
            t: 0,
            nu,
            ny,
        })
    }

    /// Construct with constant (time-invariant) system matrices, the common
    /// case.
    #[allow(clippy::too_many_arguments)]
    pub fn new_constant(
        a: DMatrix<f64>,
        b: DMatrix<f64>,
        c: DMatrix<f64>,
        d: DMatrix<f64>,
        q: DMatrix<f64>,
        r_meas: DMatrix<f64>,
        init_belief: GaussianBelief,
    ) -> Result<Self> {
        let nu = b.ncols();
        let ny = c.nrows();
        KalmanFilter::new(
            Box::new(move |_t| a.clone()),
            Box::new(move |_t| b.clone()),
            Box::new(move |_t| c.clone()),
            Box::new(move |_t| d.clone()),
            q,
            r_meas,
            init_belief,
            nu,
            ny,
        )
    }

    pub fn belief(&self) -> &GaussianBelief {
        &self.belief
    }

    /// The state transition matrix used at step `t`, for callers (the RTS
    /// smoother) that need to replay the same gain computation the forward
    /// pass used.
    pub(crate) fn a_at(&self, t: u64) -> DMatrix<f64> {
        (self.a)(t)
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
}

impl StateEstimator for KalmanFilter {
    fn predict(&mut self, u: &DVector<f64>) -> Result<()> {
        self.check_u(u)?;
        log::trace!("kalman filter predict at t={}", self.t);
        let a = (self.a)(self.t);
        let b = (self.b)(self.t);
        self.belief.mean = &a * &self.belief.mean + &b * u;
        self.belief.cov = &a * &self.belief.cov * a.transpose() + &self.q;
        self.belief.symmetrize();
        if !self.belief.mean.iter().all(|v| v.is_finite()) {
            return Err(EstimationError::NonFinite {
                context: "kalman filter predict",
            });
        }
        self.t += 1;
        Ok(())
    }

    fn correct(&mut self, u: &DVector<f64>, y: &DVector<f64>) -> Result<f64> {
        self.check_u(u)?;
        self.check_y(y)?;
        log::trace!("kalman filter correct at t={}", self.t);
        let c = (self.c)(self.t);
        let d = (self.d)(self.t);

        let e = y - &c * &self.belief.mean - &d * u;
        let s = &c * &self.belief.cov * c.transpose() + &self.r_meas;

        let (s_inv, log_det_s) = invert_spd_with_fallback(&s)?;

        let k = &self.belief.cov * c.transpose() * &s_inv;
        self.belief.mean += &k * &e;
        let identity = DMatrix::<f64>::identity(self.belief.dim(), self.belief.dim());
        self.belief.cov = (identity - &k * &c) * &self.belief.cov;
        self.belief.symmetrize();

        let ny = self.ny as f64;
        let quad = (e.transpose() * &s_inv * &e)[(0, 0)];
        let delta_ll = -0.5 * (ny * (2.0 * PI).ln() + log_det_s + quad);
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

/// Invert a symmetric positive (semi-)definite matrix via Cholesky,
/// falling back to an LU solve when Cholesky fails (near-singular input),
/// and returns `(inverse, log |S|)`. Raises [`EstimationError::SingularInnovation`]
/// if both fail.
pub(crate) fn invert_spd_with_fallback(s: &DMatrix<f64>) -> Result<(DMatrix<f64>, f64)> {
    if let Some(chol) = Cholesky::new(s.clone()) {
        let l = chol.l();
        let log_det = 2.0 * l.diagonal().iter().map(|d| d.ln()).sum::<f64>();
        let inv = chol.inverse();
        return Ok((inv, log_det));
    }
    log::warn!("innovation covariance not positive definite, falling back to LU solve");
    let lu = LU::new(s.clone());
    let det = lu.determinant();
    if det.abs() < 1e-300 || !det.is_finite() {
        return Err(EstimationError::SingularInnovation);
    }
    let inv = lu
        .try_inverse()
        .ok_or(EstimationError::SingularInnovation)?;
    Ok((inv, det.abs().ln()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn s1_filter() -> KalmanFilter {
        let a = DMatrix::identity(2, 2) * 0.9;
        let b = DMatrix::identity(2, 2);
        let c = DMatrix::identity(2, 2);
        let d = DMatrix::zeros(2, 2);
        let q = DMatrix::identity(2, 2);
        let r = DMatrix::identity(2, 2);
        let init = GaussianBelief::new(DVector::zeros(2), DMatrix::identity(2, 2) * 4.0);
        KalmanFilter::new_constant(a, b, c, d, q, r, init).unwrap()
    }

    #[test]
    fn predict_keeps_covariance_symmetric() {
        let mut kf = s1_filter();
        let u = DVector::zeros(2);
        kf.predict(&u).unwrap();
        assert_relative_eq!(kf.belief().cov, kf.belief().cov.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn correct_reduces_uncertainty() {
        let mut kf = s1_filter();
        let trace_before = kf.belief().cov.trace();
        let u = DVector::zeros(2);
        let y = DVector::zeros(2);
        kf.correct(&u, &y).unwrap();
        let trace_after = kf.belief().cov.trace();
        assert!(trace_after < trace_before);
    }

    #[test]
    fn dimension_mismatch_on_bad_control() {
        let mut kf = s1_filter();
        let bad_u = DVector::zeros(3);
        assert!(kf.predict(&bad_u).is_err());
    }

    #[test]
    fn reset_restores_initial_belief() {
        let mut kf = s1_filter();
        let u = DVector::zeros(2);
        let y = DVector::from_element(2, 1.0);
        kf.step(&u, &y).unwrap();
        kf.reset().unwrap();
        assert_eq!(kf.belief().mean, DVector::zeros(2));
        assert_eq!(kf.time(), 0);
        assert_eq!(kf.loglik(), 0.0);
    }
}
