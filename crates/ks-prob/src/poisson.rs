//! Count fluctuations for toy throwing.
//!
//! Both samplers treat a non-positive or non-finite mean as an empty region:
//! Poisson(0) is deterministically 0, and Gamma(0 + 1, 1) is only used for
//! genuinely observed counts.

use rand::Rng;
use rand_distr::{Distribution, Gamma, Poisson};

/// Draw one Poisson-distributed count with mean `lambda`.
///
/// Negative, NaN or infinite means are treated as 0.
pub fn sample_poisson<R: Rng + ?Sized>(lambda: f64, rng: &mut R) -> f64 {
    if !lambda.is_finite() || lambda <= 0.0 {
        return 0.0;
    }
    match Poisson::new(lambda) {
        Ok(pois) => pois.sample(rng),
        Err(_) => 0.0,
    }
}

/// Draw from the flat-prior posterior of a Poisson mean given `n` observed
/// entries, i.e. `Gamma(shape = n + 1, scale = 1)`.
///
/// Negative or non-finite `n` is treated as 0 observed entries.
pub fn sample_gamma_posterior<R: Rng + ?Sized>(n: f64, rng: &mut R) -> f64 {
    let n = if n.is_finite() { n.max(0.0) } else { 0.0 };
    match Gamma::new(n + 1.0, 1.0) {
        Ok(g) => g.sample(rng),
        Err(_) => 0.0,
    }
}
