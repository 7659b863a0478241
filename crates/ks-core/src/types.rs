//! Common data types for KappaStat

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, MulAssign};

/// Weighted event count in one region.
///
/// Stores the raw (unweighted) number of entries together with the sum of
/// weights and the sum of squared weights. Everything else is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GammaParams {
    raw: u64,
    sumw: f64,
    sumw2: f64,
}

impl GammaParams {
    /// Build from an explicit `(raw, sumw, sumw2)` triple.
    pub fn new(raw: u64, sumw: f64, sumw2: f64) -> Self {
        Self { raw, sumw, sumw2 }
    }

    /// A single event with weight `w`.
    pub fn from_weight(w: f64) -> Self {
        Self { raw: 1, sumw: w, sumw2: w * w }
    }

    /// An unweighted observed count (every event has weight 1).
    pub fn from_count(n: u64) -> Self {
        let n_f = n as f64;
        Self { raw: n, sumw: n_f, sumw2: n_f }
    }

    /// Raw number of entries.
    pub fn raw(&self) -> u64 {
        self.raw
    }

    /// Sum of weights.
    pub fn sumw(&self) -> f64 {
        self.sumw
    }

    /// Sum of squared weights.
    pub fn sumw2(&self) -> f64 {
        self.sumw2
    }

    /// Weighted yield (sum of weights).
    pub fn yield_(&self) -> f64 {
        self.sumw
    }

    /// Statistical uncertainty on the yield, `sqrt(sumw2)`.
    pub fn uncertainty(&self) -> f64 {
        self.sumw2.max(0.0).sqrt()
    }

    /// Effective number of unweighted entries, `sumw^2 / sumw2`.
    ///
    /// Returns 0 for an empty accumulator (`sumw2 == 0`).
    pub fn n_effective(&self) -> f64 {
        if self.sumw2 <= 0.0 {
            return 0.0;
        }
        self.sumw * self.sumw / self.sumw2
    }

    /// Mean per-event weight, `sumw / raw` (0 when `raw == 0`).
    pub fn weight(&self) -> f64 {
        if self.raw == 0 {
            return 0.0;
        }
        self.sumw / self.raw as f64
    }

    /// Weight carried by one effective entry, `sumw2 / sumw`.
    ///
    /// `n_effective() * effective_weight() == yield_()` whenever the yield is non-zero.
    pub fn effective_weight(&self) -> f64 {
        if self.sumw == 0.0 {
            return 0.0;
        }
        self.sumw2 / self.sumw
    }

    /// True when no entry was ever accumulated.
    pub fn is_empty(&self) -> bool {
        self.raw == 0 && self.sumw == 0.0 && self.sumw2 == 0.0
    }
}

impl AddAssign for GammaParams {
    fn add_assign(&mut self, rhs: Self) {
        self.raw += rhs.raw;
        self.sumw += rhs.sumw;
        self.sumw2 += rhs.sumw2;
    }
}

impl Add for GammaParams {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl Sum for GammaParams {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a GammaParams> for GammaParams {
    fn sum<I: Iterator<Item = &'a GammaParams>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Rescale the weights by `k`: `sumw *= k`, `sumw2 *= k^2`. The raw count is untouched.
impl MulAssign<f64> for GammaParams {
    fn mul_assign(&mut self, k: f64) {
        self.sumw *= k;
        self.sumw2 *= k * k;
    }
}

impl fmt::Display for GammaParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3} ± {:.3} (raw {}, neff {:.2})",
            self.yield_(),
            self.uncertainty(),
            self.raw,
            self.n_effective()
        )
    }
}

/// Whether an estimate is constrained by its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateStatus {
    /// Finite central value with a toy-based interval.
    Ok,
    /// A denominator region is empty; the value is saturated and carries no information.
    Unconstrained,
}

/// Central value with asymmetric uncertainties (kappa, prediction, transfer factor).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Central value
    pub value: f64,
    /// Upward uncertainty
    pub up: f64,
    /// Downward uncertainty
    pub down: f64,
    /// Constraint status
    pub status: EstimateStatus,
}

impl Estimate {
    /// Create a constrained estimate.
    pub fn new(value: f64, up: f64, down: f64) -> Self {
        Self { value, up, down, status: EstimateStatus::Ok }
    }

    /// Create an unconstrained estimate saturated at `value`, with no interval.
    pub fn unconstrained(value: f64) -> Self {
        Self { value, up: 0.0, down: 0.0, status: EstimateStatus::Unconstrained }
    }

    /// Clamp negative uncertainties (and non-finite ones) to 0.
    pub fn clamped(self) -> Self {
        let clamp = |x: f64| if x.is_finite() { x.max(0.0) } else { 0.0 };
        Self { up: clamp(self.up), down: clamp(self.down), ..self }
    }

    /// True for [`EstimateStatus::Ok`].
    pub fn is_constrained(&self) -> bool {
        self.status == EstimateStatus::Ok
    }

    /// `[value, up, down]`, the order used by report tables.
    pub fn as_triple(&self) -> [f64; 3] {
        [self.value, self.up, self.down]
    }
}

/// Plane-level data/MC normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneRatio {
    /// Observed over simulated yield.
    pub ratio: f64,
    /// Uncertainty on the ratio.
    pub error: f64,
    /// False when the simulated plane yield is not positive (no rescale applied).
    pub defined: bool,
}

impl PlaneRatio {
    /// Ratio `n_obs / mc` with the uncertainty
    /// `sqrt((sqrt(n_obs)/n_mc)^2 + (n_obs*sigma_mc/n_mc^2)^2)`.
    pub fn from_yields(data: &GammaParams, mc: &GammaParams) -> Self {
        let n_obs = data.yield_();
        let n_mc = mc.yield_();
        if n_mc.is_nan() || n_mc <= 0.0 || !n_obs.is_finite() {
            return Self { ratio: 1.0, error: 0.0, defined: false };
        }
        let e_obs = n_obs.max(0.0).sqrt() / n_mc;
        let e_mc = n_obs * mc.uncertainty() / (n_mc * n_mc);
        Self { ratio: n_obs / n_mc, error: e_obs.hypot(e_mc), defined: true }
    }
}

/// Yield matrix indexed `[process][flat region index]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YieldMatrix {
    rows: Vec<Vec<GammaParams>>,
}

impl YieldMatrix {
    /// Process index of observed data.
    pub const DATA: usize = 0;
    /// Process index of the total simulated background.
    pub const BACKGROUND: usize = 1;

    /// Build from per-process rows; every row must have the same length.
    pub fn new(rows: Vec<Vec<GammaParams>>) -> crate::Result<Self> {
        if let Some(first) = rows.first() {
            let n = first.len();
            if let Some((i, bad)) = rows.iter().enumerate().find(|(_, r)| r.len() != n) {
                return Err(crate::Error::Validation(format!(
                    "yield row {} has {} regions, expected {}",
                    i,
                    bad.len(),
                    n
                )));
            }
        }
        Ok(Self { rows })
    }

    /// Consume into the raw rows.
    pub fn into_rows(self) -> Vec<Vec<GammaParams>> {
        self.rows
    }
}

impl crate::traits::YieldSource for YieldMatrix {
    fn n_processes(&self) -> usize {
        self.rows.len()
    }

    fn n_regions(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    fn process(&self, process: usize) -> crate::Result<&[GammaParams]> {
        self.rows.get(process).map(Vec::as_slice).ok_or_else(|| {
            crate::Error::Validation(format!(
                "process index {} out of range ({} processes)",
                process,
                self.rows.len()
            ))
        })
    }

    fn process_mut(&mut self, process: usize) -> crate::Result<&mut [GammaParams]> {
        let n = self.rows.len();
        self.rows.get_mut(process).map(Vec::as_mut_slice).ok_or_else(|| {
            crate::Error::Validation(format!(
                "process index {} out of range ({} processes)",
                process, n
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::YieldSource;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn arb_gamma() -> impl Strategy<Value = GammaParams> {
        (0u64..10_000, 0.0f64..1e4, 0.0f64..1e4).prop_map(|(r, w, w2)| GammaParams::new(r, w, w2))
    }

    #[test]
    fn test_zero_guard() {
        let g = GammaParams::default();
        assert_eq!(g.n_effective(), 0.0);
        assert_eq!(g.weight(), 0.0);
        assert_eq!(g.effective_weight(), 0.0);
        assert!(g.is_empty());
    }

    #[test]
    fn test_single_weight() {
        let g = GammaParams::from_weight(0.5);
        assert_eq!(g.raw(), 1);
        assert_relative_eq!(g.yield_(), 0.5);
        assert_relative_eq!(g.sumw2(), 0.25);
        assert_relative_eq!(g.uncertainty(), 0.5);
        assert_relative_eq!(g.n_effective(), 1.0);
    }

    #[test]
    fn test_effective_units_recover_yield() {
        let mut g = GammaParams::default();
        for w in [0.2, 0.4, 0.4, 1.1, 0.9] {
            g += GammaParams::from_weight(w);
        }
        assert_relative_eq!(g.n_effective() * g.effective_weight(), g.yield_(), epsilon = 1e-12);
        assert!(g.n_effective() <= g.raw() as f64);
        assert_relative_eq!(g.weight(), 3.0 / 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_count_is_unweighted() {
        let g = GammaParams::from_count(40);
        assert_relative_eq!(g.n_effective(), 40.0);
        assert_relative_eq!(g.effective_weight(), 1.0);
        assert_relative_eq!(g.uncertainty(), 40f64.sqrt());
    }

    #[test]
    fn test_rescale_keeps_neff_and_raw() {
        let mut g = GammaParams::new(10, 4.0, 2.0);
        let neff = g.n_effective();
        g *= 2.5;
        assert_eq!(g.raw(), 10);
        assert_relative_eq!(g.yield_(), 10.0);
        assert_relative_eq!(g.n_effective(), neff, epsilon = 1e-12);
    }

    #[test]
    fn test_plane_ratio_undefined_without_mc() {
        let r = PlaneRatio::from_yields(&GammaParams::from_count(5), &GammaParams::default());
        assert!(!r.defined);
        assert_eq!(r.ratio, 1.0);
    }

    #[test]
    fn test_plane_ratio_equal_yields() {
        let d = GammaParams::from_count(400);
        let r = PlaneRatio::from_yields(&d, &d);
        assert!(r.defined);
        assert_relative_eq!(r.ratio, 1.0);
        // sqrt(2)/sqrt(N): data and MC contribute equally.
        assert_relative_eq!(r.error, (2.0f64 / 400.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_estimate_clamped() {
        let e = Estimate::new(1.0, -0.1, -0.5).clamped();
        assert_eq!(e.up, 0.0);
        assert_eq!(e.down, 0.0);
        assert!(e.is_constrained());
        let u = Estimate::unconstrained(1e10);
        assert!(!u.is_constrained());
        let json = serde_json::to_string(&u).unwrap();
        assert!(json.contains("\"unconstrained\""), "{json}");
    }

    #[test]
    fn test_yield_matrix_shape() {
        let ok = YieldMatrix::new(vec![vec![GammaParams::default(); 3]; 2]).unwrap();
        assert_eq!(ok.n_processes(), 2);
        assert_eq!(ok.n_regions(), 3);
        assert!(ok.process(2).is_err());

        let bad = YieldMatrix::new(vec![vec![GammaParams::default(); 3], vec![]]);
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn prop_merge_is_componentwise(a in arb_gamma(), b in arb_gamma()) {
            let mut m = a;
            m += b;
            prop_assert_eq!(m.raw(), a.raw() + b.raw());
            prop_assert_eq!(m.sumw(), a.sumw() + b.sumw());
            prop_assert_eq!(m.sumw2(), a.sumw2() + b.sumw2());
        }

        #[test]
        fn prop_merge_commutes(a in arb_gamma(), b in arb_gamma()) {
            prop_assert_eq!(a + b, b + a);
        }

        #[test]
        fn prop_merge_associates(a in arb_gamma(), b in arb_gamma(), c in arb_gamma()) {
            let l = (a + b) + c;
            let r = a + (b + c);
            prop_assert_eq!(l.raw(), r.raw());
            prop_assert!((l.sumw() - r.sumw()).abs() <= 1e-9 * (1.0 + l.sumw().abs()));
            prop_assert!((l.sumw2() - r.sumw2()).abs() <= 1e-9 * (1.0 + l.sumw2().abs()));
        }

        #[test]
        fn prop_rescale_round_trip(a in arb_gamma(), k in 0.01f64..100.0) {
            let mut g = a;
            g *= k;
            g *= 1.0 / k;
            prop_assert!((g.yield_() - a.yield_()).abs() <= 1e-9 * (1.0 + a.yield_().abs()));
        }
    }
}
