//! Toy-based product/ratio estimator with asymmetric uncertainties.
//!
//! Computes `prod_i N_i^p_i` for a handful of region counts `N_i` and signed
//! integer powers `p_i` (e.g. `{+1,-1,-1,+1}` for the classic ABCD kappa).
//! The product of several Poisson variables has no closed-form asymmetric
//! interval, so the interval comes from toys: every region is fluctuated in
//! *effective* units (`n_eff` entries of weight `w`) and the 15.87 % / 84.13 %
//! quantiles of the toy ensemble give the ±1σ band.
//!
//! Notes:
//! - The central value is the analytic product, not the toy median.
//! - Randomness comes from the caller's RNG; identical RNG state gives identical results.
//! - A region with zero yield in a denominator makes the estimate
//!   [`EstimateStatus::Unconstrained`](ks_core::EstimateStatus), saturated at [`SATURATED_VALUE`].

use ks_core::{Error, Estimate, GammaParams, Result};
use ks_prob::math::{PowerProduct, power_product};
use ks_prob::poisson::{sample_gamma_posterior, sample_poisson};
use ks_prob::quantile::{ONE_SIGMA_HIGH, one_sigma_band_sorted};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Value reported for products whose denominator vanished.
pub const SATURATED_VALUE: f64 = 1e10;

/// Default number of toys per estimate.
pub const DEFAULT_N_TOYS: usize = 10_000;

/// How one effective count is fluctuated in a toy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampling {
    /// `Poisson(n_eff)`.
    #[default]
    Poisson,
    /// `Gamma(n_eff + 1, 1)`, the flat-prior posterior of an observed count.
    GammaPosterior,
}

impl Sampling {
    fn draw<R: Rng + ?Sized>(self, n_effective: f64, rng: &mut R) -> f64 {
        match self {
            Sampling::Poisson => sample_poisson(n_effective, rng),
            Sampling::GammaPosterior => sample_gamma_posterior(n_effective, rng),
        }
    }
}

/// Toy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToyConfig {
    /// Number of toys per estimate.
    pub n_toys: usize,
    /// Count fluctuation model.
    #[serde(default)]
    pub sampling: Sampling,
}

impl Default for ToyConfig {
    fn default() -> Self {
        Self { n_toys: DEFAULT_N_TOYS, sampling: Sampling::Poisson }
    }
}

/// One weighted sample in effective units: `n_effective` entries of weight `weight`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedEntry {
    /// Effective number of entries.
    pub n_effective: f64,
    /// Weight of one effective entry.
    pub weight: f64,
}

impl WeightedEntry {
    /// Effective representation of a weighted accumulator.
    ///
    /// A non-positive (or NaN) net yield, e.g. from negative-weight samples,
    /// becomes an empty entry.
    pub fn from_gamma(g: &GammaParams) -> Self {
        if g.yield_().is_nan() || g.yield_() <= 0.0 {
            return Self::empty();
        }
        Self { n_effective: g.n_effective(), weight: g.effective_weight() }
    }

    /// Zero entries.
    pub fn empty() -> Self {
        Self { n_effective: 0.0, weight: 1.0 }
    }

    /// A count taken at face value (unit weight).
    pub fn unweighted(count: f64) -> Self {
        Self { n_effective: count, weight: 1.0 }
    }

    /// `n_effective * weight`.
    pub fn yield_(&self) -> f64 {
        self.n_effective * self.weight
    }
}

/// A region entering the product: one or more samples summed before the power is applied.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegionTerm {
    /// Samples summed into this region.
    pub entries: Vec<WeightedEntry>,
}

impl RegionTerm {
    /// Region made of a single sample.
    pub fn single(entry: WeightedEntry) -> Self {
        Self { entries: vec![entry] }
    }

    /// Region made of several processes merged together (e.g. background components).
    pub fn from_gammas<'a, I: IntoIterator<Item = &'a GammaParams>>(gammas: I) -> Self {
        Self { entries: gammas.into_iter().map(WeightedEntry::from_gamma).collect() }
    }

    /// Summed yield.
    pub fn yield_(&self) -> f64 {
        self.entries.iter().map(WeightedEntry::yield_).sum()
    }

    fn draw<R: Rng + ?Sized>(&self, sampling: Sampling, rng: &mut R) -> f64 {
        self.entries.iter().map(|e| sampling.draw(e.n_effective, rng) * e.weight).sum()
    }
}

/// Estimate plus toy diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KappaResult {
    /// Central value with (unclamped) asymmetric band.
    pub estimate: Estimate,
    /// Median of the toy ensemble.
    pub median: f64,
    /// Toys thrown.
    pub n_toys: usize,
    /// Toys whose denominator fluctuated to zero.
    pub n_saturated: usize,
}

fn validate(terms: &[RegionTerm], powers: &[i32], config: &ToyConfig) -> Result<()> {
    if terms.is_empty() {
        return Err(Error::Validation("calc_kappa requires at least one region".to_string()));
    }
    if terms.len() != powers.len() {
        return Err(Error::Validation(format!(
            "calc_kappa: {} regions but {} powers",
            terms.len(),
            powers.len()
        )));
    }
    if config.n_toys < 2 {
        return Err(Error::Validation(format!(
            "calc_kappa requires at least 2 toys, got {}",
            config.n_toys
        )));
    }
    for (i, term) in terms.iter().enumerate() {
        if term.entries.is_empty() {
            return Err(Error::Validation(format!("calc_kappa: region {} has no entries", i)));
        }
        for e in &term.entries {
            let ok = e.n_effective.is_finite()
                && e.n_effective >= 0.0
                && e.weight.is_finite()
                && e.weight >= 0.0;
            if !ok {
                return Err(Error::Validation(format!(
                    "calc_kappa: region {} has invalid entry (n_eff={}, weight={})",
                    i, e.n_effective, e.weight
                )));
            }
        }
    }
    Ok(())
}

/// Product `prod_i yield(terms[i])^powers[i]` with a toy-based ±1σ band.
///
/// `up = q84 - central` and `down = central - q16`; either may come out
/// negative for very skewed ensembles and is left for the caller to clamp
/// ([`Estimate::clamped`]).
pub fn calc_kappa<R: Rng + ?Sized>(
    terms: &[RegionTerm],
    powers: &[i32],
    config: &ToyConfig,
    rng: &mut R,
) -> Result<KappaResult> {
    validate(terms, powers, config)?;

    let yields: Vec<f64> = terms.iter().map(RegionTerm::yield_).collect();
    let central = match power_product(&yields, powers) {
        PowerProduct::Finite(v) => v,
        PowerProduct::Zero => 0.0,
        PowerProduct::Unbounded => {
            tracing::debug!(?yields, ?powers, "empty denominator, estimate unconstrained");
            return Ok(KappaResult {
                estimate: Estimate::unconstrained(SATURATED_VALUE),
                median: SATURATED_VALUE,
                n_toys: 0,
                n_saturated: 0,
            });
        }
    };

    let mut toys = Vec::with_capacity(config.n_toys);
    let mut fluctuated = vec![0.0; terms.len()];
    let mut n_saturated = 0usize;
    for _ in 0..config.n_toys {
        for (slot, term) in fluctuated.iter_mut().zip(terms) {
            *slot = term.draw(config.sampling, rng);
        }
        let p = power_product(&fluctuated, powers);
        if p == PowerProduct::Unbounded {
            n_saturated += 1;
        }
        toys.push(p.value_or(SATURATED_VALUE));
    }
    toys.sort_by(f64::total_cmp);
    let (q16, median, q84) = one_sigma_band_sorted(&toys);

    if n_saturated as f64 > (1.0 - ONE_SIGMA_HIGH) * config.n_toys as f64 {
        tracing::warn!(
            n_saturated,
            n_toys = config.n_toys,
            "upper band reaches saturated toys; denominator statistics are too low"
        );
    }

    Ok(KappaResult {
        estimate: Estimate::new(central, q84 - central, central - q16),
        median,
        n_toys: config.n_toys,
        n_saturated,
    })
}
