//! Likelihood-based parameter inference: marginal log-likelihood evaluation
//! through a filter, and a random-walk Metropolis sampler (single-chain and
//! multi-chain via `rayon`) over an unnormalized log-posterior built from it.

use nalgebra::DVector;
use rand::{Rng, RngCore};
use rayon::prelude::*;

use crate::distributions::UnivariateDistribution;
use crate::error::Result;
use crate::filters::StateEstimator;
use crate::random::RandomSource;

/// Reset `filter` to its initial belief, then run it over the full
/// input/observation sequence and return the accumulated log marginal
/// likelihood.
pub fn loglik(
    filter: &mut dyn StateEstimator,
    u: &[DVector<f64>],
    y: &[DVector<f64>],
) -> Result<f64> {
    filter.reset()?;
    let mut total = 0.0;
    for t in 0..u.len() {
        total += filter.step(&u[t], &y[t])?;
    }
    Ok(total)
}

/// Build an unnormalized log-posterior `theta -> log p(theta) + log p(y | theta)`
/// from independent parameter priors and a filter constructor.
///
/// `filter_from_parameters` builds a fresh filter for a given parameter
/// vector; returning `Err` (e.g. an invalid covariance) or the filter
/// producing a [`crate::error::EstimationError`] partway through maps to
/// `-inf`, so the sampler simply rejects that proposal rather than
/// propagating the error.
pub fn log_likelihood_fun<F>(
    filter_from_parameters: F,
    priors: Vec<Box<dyn UnivariateDistribution>>,
    u: Vec<DVector<f64>>,
    y: Vec<DVector<f64>>,
) -> impl Fn(&[f64]) -> f64
where
    F: Fn(&[f64]) -> Result<Box<dyn StateEstimator>>,
{
    move |theta: &[f64]| {
        let log_prior: f64 = priors
            .iter()
            .zip(theta.iter())
            .map(|(p, &v)| p.logpdf(v))
            .sum();
        if !log_prior.is_finite() {
            return f64::NEG_INFINITY;
        }
        let mut filter = match filter_from_parameters(theta) {
            Ok(f) => f,
            Err(_) => return f64::NEG_INFINITY,
        };
        match loglik(filter.as_mut(), &u, &y) {
            Ok(ll) if ll.is_finite() => log_prior + ll,
            _ => f64::NEG_INFINITY,
        }
    }
}

/// Random-walk Metropolis-Hastings over an unnormalized log-posterior `f`.
///
/// `draw` proposes a new parameter vector given the current one (e.g. a
/// symmetric Gaussian random walk); the acceptance ratio assumes a symmetric
/// proposal. Returns the chain and its log-posterior trace, each of length
/// `iters + 1` with index 0 holding `theta0`. Burn-in and thinning are the
/// caller's responsibility.
pub fn metropolis<F, D>(
    f: F,
    iters: usize,
    theta0: Vec<f64>,
    draw: D,
    rng: &mut RandomSource,
) -> (Vec<Vec<f64>>, Vec<f64>)
where
    F: Fn(&[f64]) -> f64,
    D: Fn(&[f64], &mut dyn RngCore) -> Vec<f64>,
{
    let mut chain = Vec::with_capacity(iters + 1);
    let mut log_posts = Vec::with_capacity(iters + 1);

    let mut current = theta0;
    let mut current_lp = f(&current);
    chain.push(current.clone());
    log_posts.push(current_lp);

    let mut n_accepted = 0usize;
    for _ in 0..iters {
        let proposal = draw(&current, rng.rng_mut());
        let proposal_lp = f(&proposal);
        let log_accept_ratio = proposal_lp - current_lp;
        let accept = log_accept_ratio >= 0.0 || {
            let u: f64 = rng.rng_mut().gen();
            u.ln() < log_accept_ratio
        };
        if accept {
            current = proposal;
            current_lp = proposal_lp;
            n_accepted += 1;
        }
        chain.push(current.clone());
        log_posts.push(current_lp);
    }
    log::debug!(
        "metropolis: {}/{} proposals accepted ({:.1}%)",
        n_accepted,
        iters,
        100.0 * n_accepted as f64 / iters.max(1) as f64
    );
    (chain, log_posts)
}

/// Run `n_chains` independent Metropolis chains in parallel via `rayon`,
/// each starting from `theta0` with an RNG stream derived from `rng` so the
/// whole multi-chain run is reproducible from one seed.
pub fn metropolis_threaded<F, D>(
    f: F,
    iters: usize,
    theta0: Vec<f64>,
    draw: D,
    rng: &RandomSource,
    n_chains: usize,
) -> Vec<(Vec<Vec<f64>>, Vec<f64>)>
where
    F: Fn(&[f64]) -> f64 + Sync,
    D: Fn(&[f64], &mut dyn RngCore) -> Vec<f64> + Sync,
{
    (0..n_chains)
        .into_par_iter()
        .map(|i| {
            let mut chain_rng = rng.derive(i as u64);
            metropolis(&f, iters, theta0.clone(), &draw, &mut chain_rng)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::UnivariateNormal;
    use approx::assert_relative_eq;
    use rand_distr::{Distribution as _, StandardNormal};

    fn gaussian_mean_log_posterior(data: Vec<f64>) -> impl Fn(&[f64]) -> f64 {
        let prior = UnivariateNormal::new(0.0, 100.0).unwrap();
        move |theta: &[f64]| {
            let mu = theta[0];
            let log_prior = prior.logpdf(mu);
            let log_lik: f64 = data
                .iter()
                .map(|&x| {
                    let r = x - mu;
                    -0.5 * (r * r + (2.0 * std::f64::consts::PI).ln())
                })
                .sum();
            log_prior + log_lik
        }
    }

    fn random_walk(step: f64) -> impl Fn(&[f64], &mut dyn RngCore) -> Vec<f64> {
        move |theta: &[f64], rng: &mut dyn RngCore| {
            let noise: f64 = StandardNormal.sample(rng);
            vec![theta[0] + step * noise]
        }
    }

    #[test]
    fn metropolis_recovers_known_mean() {
        let true_mean = 2.5;
        let mut gen_rng = RandomSource::from_seed(41);
        let data: Vec<f64> = (0..200)
            .map(|_| {
                let noise: f64 = StandardNormal.sample(gen_rng.rng_mut());
                true_mean + noise
            })
            .collect();

        let f = gaussian_mean_log_posterior(data);
        let mut rng = RandomSource::from_seed(7);
        let (chain, _log_posts) = metropolis(f, 4000, vec![0.0], random_walk(0.3), &mut rng);

        let burn_in = 500;
        let post_burn: Vec<f64> = chain[burn_in..].iter().map(|theta| theta[0]).collect();
        let mean: f64 = post_burn.iter().sum::<f64>() / post_burn.len() as f64;
        assert_relative_eq!(mean, true_mean, epsilon = 0.3);
    }

    #[test]
    fn metropolis_chain_includes_initial_state() {
        let f = |theta: &[f64]| -0.5 * theta[0] * theta[0];
        let mut rng = RandomSource::from_seed(1);
        let (chain, log_posts) = metropolis(f, 10, vec![3.0], random_walk(0.1), &mut rng);
        assert_eq!(chain[0], vec![3.0]);
        assert_eq!(chain.len(), 11);
        assert_eq!(log_posts.len(), 11);
    }

    #[test]
    fn metropolis_threaded_produces_one_result_per_chain() {
        let f = |theta: &[f64]| -0.5 * theta[0] * theta[0];
        let rng = RandomSource::from_seed(5);
        let results = metropolis_threaded(f, 200, vec![0.0], random_walk(0.2), &rng, 4);
        assert_eq!(results.len(), 4);
        for (chain, log_posts) in &results {
            assert_eq!(chain.len(), 201);
            assert_eq!(log_posts.len(), 201);
        }
    }
}
