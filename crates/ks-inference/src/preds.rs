//! Background predictions for every (plane, bin) of an ABCD method.
//!
//! Per plane the simulated background is first normalized to data using the
//! plane-inclusive yields, then four toy estimates are computed per bin:
//!
//! | output                   | inputs                                   | powers            |
//! |--------------------------|------------------------------------------|-------------------|
//! | `kappas_mc`              | MC R1..R4, effective entries             | `POW_KAPPA`       |
//! | `kappas_data`            | data R1..R4, unit weight                 | `POW_KAPPA`       |
//! | `kappas_mc_data_errors`  | MC R1..R4 yields, unit weight            | `POW_KAPPA`       |
//! | `preds`                  | data R1..R3, MC R1..R4 effective entries | `POW_TOTAL_PRED`  |
//!
//! Every estimate draws from its own RNG stream derived from
//! `(seed, plane, bin, kind)`, so results do not depend on evaluation order.

use crate::kappa::{RegionTerm, ToyConfig, WeightedEntry, calc_kappa};
use crate::plane::{AbcdMethod, Quadrant};
use ks_core::{Error, Estimate, GammaParams, PlaneRatio, Result, YieldMatrix, YieldSource};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Powers of `{R1, R2, R3, R4}` in the kappa double ratio.
pub const POW_KAPPA: [i32; 4] = [1, -1, -1, 1];

/// Powers of `{data R1, R2, R3, MC R1, R2, R3, R4}` in the total prediction
/// `R2_data * R3_data / R1_data * kappa_mc`.
pub const POW_TOTAL_PRED: [i32; 7] = [-1, 1, 1, 1, -1, -1, 1];

/// Default base seed.
pub const DEFAULT_SEED: u64 = 1234;

/// Prediction configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Toy settings shared by every estimate.
    #[serde(default)]
    pub toys: ToyConfig,
    /// Base seed of the per-estimate RNG streams.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self { toys: ToyConfig::default(), seed: DEFAULT_SEED }
    }
}

/// Estimate kinds, one RNG stream each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Prediction = 0,
    KappaMc = 1,
    KappaData = 2,
    KappaMcDataErrors = 3,
    TransferFactor = 4,
}

/// SplitMix64 finalizer.
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Seed of the RNG stream for one `(plane, bin, kind)` estimate.
pub fn stream_seed(seed: u64, plane: usize, bin: usize, kind: u64) -> u64 {
    const GOLDEN: u64 = 0x9e37_79b9_7f4a_7c15;
    let mut h = mix64(seed.wrapping_add(GOLDEN));
    for part in [plane as u64, bin as u64, kind] {
        h = mix64(h ^ part.wrapping_add(GOLDEN).wrapping_add(h << 6).wrapping_add(h >> 2));
    }
    h
}

/// Output of [`find_preds`]: per-plane normalizations and nested `[plane][bin]` estimates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predictions {
    /// Data/MC normalization of each plane.
    pub plane_ratios: Vec<PlaneRatio>,
    /// Kappa from simulation with MC statistical errors.
    pub kappas_mc: Vec<Vec<Estimate>>,
    /// Kappa from data (or pseudodata) counts.
    pub kappas_data: Vec<Vec<Estimate>>,
    /// Kappa from simulation with errors of a data-sized sample.
    pub kappas_mc_data_errors: Vec<Vec<Estimate>>,
    /// Total background prediction in R4.
    pub preds: Vec<Vec<Estimate>>,
}

impl Predictions {
    /// Number of planes.
    pub fn n_planes(&self) -> usize {
        self.preds.len()
    }

    /// Prediction for `(plane, bin)`.
    pub fn pred(&self, plane: usize, bin: usize) -> Option<&Estimate> {
        self.preds.get(plane).and_then(|p| p.get(bin))
    }
}

fn check_shape<Y: YieldSource + ?Sized>(method: &AbcdMethod, yields: &Y) -> Result<()> {
    if yields.n_processes() < 2 {
        return Err(Error::Validation(format!(
            "method '{}': need data and background yields, got {} processes",
            method.name(),
            yields.n_processes()
        )));
    }
    if yields.n_regions() != method.total_rows() {
        return Err(Error::Validation(format!(
            "method '{}': yields have {} regions, method defines {}",
            method.name(),
            yields.n_regions(),
            method.total_rows()
        )));
    }
    for process in [YieldMatrix::DATA, YieldMatrix::BACKGROUND] {
        let n = yields.process(process)?.len();
        if n != method.total_rows() {
            return Err(Error::Validation(format!(
                "method '{}': process {} has {} regions, method defines {}",
                method.name(),
                process,
                n,
                method.total_rows()
            )));
        }
    }
    Ok(())
}

fn estimate(terms: &[RegionTerm], powers: &[i32], cfg: &PredictionConfig, seed: u64) -> Result<Estimate> {
    let mut rng = StdRng::seed_from_u64(seed);
    let r = calc_kappa(terms, powers, &cfg.toys, &mut rng)?;
    Ok(r.estimate.clamped())
}

/// Plane-inclusive data/MC ratio; integrated rows are counted once.
pub fn plane_ratio<Y: YieldSource + ?Sized>(
    method: &AbcdMethod,
    yields: &Y,
    plane: usize,
) -> Result<PlaneRatio> {
    let rows = method.plane_rows(plane);
    let plane_sum = |process: usize| -> Result<GammaParams> {
        let slice = yields.process(process)?.get(rows.clone()).ok_or_else(|| {
            Error::Validation(format!(
                "method '{}': plane {} rows {:?} exceed process {} yields",
                method.name(),
                plane,
                rows,
                process
            ))
        })?;
        Ok(slice.iter().sum())
    };
    let data = plane_sum(YieldMatrix::DATA)?;
    let mc = plane_sum(YieldMatrix::BACKGROUND)?;
    Ok(PlaneRatio::from_yields(&data, &mc))
}

/// Normalize simulation to data plane by plane and compute kappas and predictions.
///
/// The background process of `yields` is rescaled in place; every row of a
/// plane is scaled exactly once. Planes whose simulated yield is not positive
/// keep their yields and report an undefined ratio.
pub fn find_preds<Y: YieldSource + ?Sized>(
    method: &AbcdMethod,
    yields: &mut Y,
    config: &PredictionConfig,
) -> Result<Predictions> {
    check_shape(method, yields)?;
    tracing::info!(
        method = method.name(),
        planes = method.n_planes(),
        rows = method.total_rows(),
        n_toys = config.toys.n_toys,
        "finding predictions"
    );

    let n_planes = method.n_planes();
    let mut out = Predictions {
        plane_ratios: Vec::with_capacity(n_planes),
        kappas_mc: Vec::with_capacity(n_planes),
        kappas_data: Vec::with_capacity(n_planes),
        kappas_mc_data_errors: Vec::with_capacity(n_planes),
        preds: Vec::with_capacity(n_planes),
    };

    for plane in 0..n_planes {
        let ratio = plane_ratio(method, yields, plane)?;
        if ratio.defined {
            for g in &mut yields.process_mut(YieldMatrix::BACKGROUND)?[method.plane_rows(plane)] {
                *g *= ratio.ratio;
            }
        } else {
            tracing::warn!(method = method.name(), plane, "simulated plane yield is empty, no data/MC rescale");
        }
        tracing::debug!(plane, ratio = ratio.ratio, error = ratio.error, "plane normalization");
        out.plane_ratios.push(ratio);

        let data = yields.process(YieldMatrix::DATA)?;
        let mc = yields.process(YieldMatrix::BACKGROUND)?;
        let n_bins = method.n_bins(plane);
        let mut kappas_mc = Vec::with_capacity(n_bins);
        let mut kappas_data = Vec::with_capacity(n_bins);
        let mut kappas_mcd = Vec::with_capacity(n_bins);
        let mut preds = Vec::with_capacity(n_bins);

        for bin in 0..n_bins {
            let mut rows = [0usize; 4];
            for q in Quadrant::ALL {
                rows[q.index()] = method.index_bin(plane, bin, q)?;
            }

            for &i in &rows {
                if mc[i].yield_() < 0.0 {
                    tracing::warn!(
                        method = method.name(),
                        plane,
                        bin,
                        row = i,
                        yield_ = mc[i].yield_(),
                        "negative net background yield, region treated as empty"
                    );
                }
            }

            let mc_eff: Vec<RegionTerm> =
                rows.iter().map(|&i| RegionTerm::single(WeightedEntry::from_gamma(&mc[i]))).collect();
            let data_unit: Vec<RegionTerm> = rows
                .iter()
                .map(|&i| RegionTerm::single(WeightedEntry::unweighted(data[i].yield_().max(0.0))))
                .collect();
            let mc_unit: Vec<RegionTerm> = rows
                .iter()
                .map(|&i| RegionTerm::single(WeightedEntry::unweighted(mc[i].yield_().max(0.0))))
                .collect();
            let total: Vec<RegionTerm> = data_unit[..3].iter().chain(&mc_eff).cloned().collect();

            let seed = |kind: Kind| stream_seed(config.seed, plane, bin, kind as u64);
            let pred = estimate(&total, &POW_TOTAL_PRED, config, seed(Kind::Prediction))?;
            let k_mc = estimate(&mc_eff, &POW_KAPPA, config, seed(Kind::KappaMc))?;
            let k_data = estimate(&data_unit, &POW_KAPPA, config, seed(Kind::KappaData))?;
            let k_mcd = estimate(&mc_unit, &POW_KAPPA, config, seed(Kind::KappaMcDataErrors))?;

            if !pred.is_constrained() {
                tracing::warn!(method = method.name(), plane, bin, "prediction unconstrained (empty denominator)");
            }
            tracing::debug!(plane, bin, pred = pred.value, kappa = k_mc.value, "bin estimated");

            preds.push(pred);
            kappas_mc.push(k_mc);
            kappas_data.push(k_data);
            kappas_mcd.push(k_mcd);
        }

        out.kappas_mc.push(kappas_mc);
        out.kappas_data.push(kappas_data);
        out.kappas_mc_data_errors.push(kappas_mcd);
        out.preds.push(preds);
    }
    Ok(out)
}
