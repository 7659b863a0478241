//! Signal-region / control-region transfer factors.
//!
//! A transfer factor extrapolates a control-region count into the signal
//! region: `tf = N_SR(numerator) / N_CR(denominator)`, where the numerator is
//! usually one background (e.g. top) and the denominator the total background
//! of the paired control region. The band comes from [`calc_kappa`] with
//! powers `{+1, -1}`.

use crate::kappa::{RegionTerm, ToyConfig, WeightedEntry, calc_kappa};
use crate::preds::{Kind, PredictionConfig, stream_seed};
use ks_core::{Estimate, GammaParams, Result};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Powers of `{SR numerator, CR denominator}`.
pub const POW_TRANSFER: [i32; 2] = [1, -1];

/// One signal-region/control-region pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransferPair {
    /// Signal-region yield of the extrapolated process.
    pub signal_region: GammaParams,
    /// Control-region yield it is extrapolated from.
    pub control_region: GammaParams,
}

/// Transfer factor of one pair, uncertainties clamped at 0.
pub fn transfer_factor<R: Rng + ?Sized>(
    pair: &TransferPair,
    toys: &ToyConfig,
    rng: &mut R,
) -> Result<Estimate> {
    let terms = [
        RegionTerm::single(WeightedEntry::from_gamma(&pair.signal_region)),
        RegionTerm::single(WeightedEntry::from_gamma(&pair.control_region)),
    ];
    Ok(calc_kappa(&terms, &POW_TRANSFER, toys, rng)?.estimate.clamped())
}

/// Transfer factors of every pair, each with its own RNG stream.
pub fn transfer_factors(pairs: &[TransferPair], config: &PredictionConfig) -> Result<Vec<Estimate>> {
    pairs
        .iter()
        .enumerate()
        .map(|(i, pair)| -> Result<Estimate> {
            let mut rng =
                StdRng::seed_from_u64(stream_seed(config.seed, 0, i, Kind::TransferFactor as u64));
            let tf = transfer_factor(pair, &config.toys, &mut rng)?;
            tracing::debug!(bin = i, value = tf.value, up = tf.up, down = tf.down, "transfer factor");
            Ok(tf)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kappa::Sampling;
    use approx::assert_relative_eq;
    use ks_core::EstimateStatus;

    fn cfg() -> PredictionConfig {
        PredictionConfig { toys: ToyConfig { n_toys: 1000, sampling: Sampling::Poisson }, seed: 7 }
    }

    #[test]
    fn test_transfer_factor_central_value() {
        let pair = TransferPair {
            signal_region: GammaParams::new(50, 12.0, 3.0),
            control_region: GammaParams::new(200, 48.0, 12.0),
        };
        let tfs = transfer_factors(&[pair, pair], &cfg()).unwrap();
        assert_eq!(tfs.len(), 2);
        assert_relative_eq!(tfs[0].value, 0.25, epsilon = 1e-12);
        assert!(tfs[0].up > 0.0 && tfs[0].down >= 0.0);
        assert_relative_eq!(tfs[1].value, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_control_region_is_unconstrained() {
        let pair = TransferPair { signal_region: GammaParams::from_count(5), control_region: GammaParams::default() };
        let tfs = transfer_factors(&[pair], &cfg()).unwrap();
        assert_eq!(tfs[0].status, EstimateStatus::Unconstrained);
    }

    #[test]
    fn test_same_seed_same_factors() {
        let pair = TransferPair {
            signal_region: GammaParams::from_count(30),
            control_region: GammaParams::from_count(90),
        };
        assert_eq!(transfer_factors(&[pair], &cfg()).unwrap(), transfer_factors(&[pair], &cfg()).unwrap());
    }
}
