//! Counting-experiment datacards for the statistical fitting tool.
//!
//! One channel per signal-region bin, one column per process (signal first,
//! then the backgrounds). The first background is extrapolated from a paired
//! control region: its statistics enter as a `gmN` nuisance whose coefficient
//! is the SR/CR transfer factor.
//!
//! Per-bin nuisances are numbered with twice the bin index (`_CR_stat0`,
//! `_CR_stat2`, ...), matching the row layout of the cards this replaces.

use ks_core::{Error, Estimate, GammaParams, Result};
use ks_inference::TransferPair;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

use crate::yields::YieldEntry;

const W_NAME: usize = 21;
const W_DIST: usize = 2;
const W_BIN_MIN: usize = 12;
const W_SYST: usize = 14;
const W_SYST_TYPE: usize = W_NAME - W_SYST;

/// Flat log-normal uncertainties.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatSystematics {
    /// Luminosity (signal and the non-extrapolated backgrounds).
    #[serde(default = "default_lumi")]
    pub lumi: f64,
    /// Background normalization.
    #[serde(default = "default_flat")]
    pub bkg_flat: f64,
    /// Signal normalization.
    #[serde(default = "default_flat")]
    pub sig_flat: f64,
}

fn default_lumi() -> f64 {
    1.05
}

fn default_flat() -> f64 {
    1.15
}

fn default_prefix() -> String {
    "mCT".to_string()
}

impl Default for FlatSystematics {
    fn default() -> Self {
        Self { lumi: default_lumi(), bkg_flat: default_flat(), sig_flat: default_flat() }
    }
}

/// One signal-region bin with its paired control region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatacardBin {
    /// Channel name.
    pub name: String,
    /// Background yields in the signal region, aligned with `backgrounds`.
    pub signal_region: Vec<YieldEntry>,
    /// Background yields in the control region, aligned with `backgrounds`.
    pub control_region: Vec<YieldEntry>,
}

/// One signal hypothesis (one card each).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPoint {
    /// Tag used in the card file name.
    pub name: String,
    /// Signal-region yield per bin.
    pub yields: Vec<YieldEntry>,
}

/// Datacard input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatacardInput {
    /// Background process names; the first one is taken from the control region.
    pub backgrounds: Vec<String>,
    /// Channels.
    pub bins: Vec<DatacardBin>,
    /// Signal hypotheses.
    pub signals: Vec<SignalPoint>,
    /// Observation includes the signal (expected discovery significance).
    #[serde(default)]
    pub discovery_mode: bool,
    /// Prefix of the control-region statistics nuisances.
    #[serde(default = "default_prefix")]
    pub cr_stat_prefix: String,
    /// Flat uncertainties.
    #[serde(default)]
    pub systematics: FlatSystematics,
}

/// Parsed and validated channel yields.
#[derive(Debug, Clone)]
struct Channel<'a> {
    name: &'a str,
    sr: Vec<GammaParams>,
    cr_total: GammaParams,
}

impl DatacardInput {
    /// Read a JSON datacard input.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let input: Self = serde_json::from_slice(&bytes)?;
        input.validate()?;
        Ok(input)
    }

    /// Check the per-bin and per-signal lengths.
    pub fn validate(&self) -> Result<()> {
        if self.backgrounds.is_empty() {
            return Err(Error::Validation("datacard: no background processes".to_string()));
        }
        if self.bins.is_empty() {
            return Err(Error::Validation("datacard: no bins".to_string()));
        }
        if self.signals.is_empty() {
            return Err(Error::Validation("datacard: no signal points".to_string()));
        }
        let nbg = self.backgrounds.len();
        for b in &self.bins {
            if b.signal_region.len() != nbg || b.control_region.len() != nbg {
                return Err(Error::Validation(format!(
                    "datacard bin '{}': expected {} background yields in SR and CR, got {} and {}",
                    b.name,
                    nbg,
                    b.signal_region.len(),
                    b.control_region.len()
                )));
            }
        }
        for s in &self.signals {
            if s.yields.len() != self.bins.len() {
                return Err(Error::Validation(format!(
                    "signal '{}': {} yields for {} bins",
                    s.name,
                    s.yields.len(),
                    self.bins.len()
                )));
            }
        }
        Ok(())
    }

    fn channels(&self) -> Result<Vec<Channel<'_>>> {
        let mut out = Vec::with_capacity(self.bins.len());
        for b in &self.bins {
            let sr = b.signal_region.iter().map(YieldEntry::to_gamma).collect::<Result<Vec<_>>>()?;
            let cr = b.control_region.iter().map(YieldEntry::to_gamma).collect::<Result<Vec<_>>>()?;
            out.push(Channel { name: &b.name, sr, cr_total: cr.into_iter().sum() });
        }
        Ok(out)
    }

    /// SR first-background over CR total-background, per bin.
    pub fn transfer_pairs(&self) -> Result<Vec<TransferPair>> {
        Ok(self
            .channels()?
            .into_iter()
            .map(|c| TransferPair {
                signal_region: c.sr.first().copied().unwrap_or_default(),
                control_region: c.cr_total,
            })
            .collect())
    }

    /// Index of a signal point by name.
    pub fn signal_index(&self, name: &str) -> Result<usize> {
        self.signals.iter().position(|s| s.name == name).ok_or_else(|| {
            let names: Vec<&str> = self.signals.iter().map(|s| s.name.as_str()).collect();
            Error::Validation(format!("unknown signal '{}' (available: {})", name, names.join(", ")))
        })
    }

    /// Render the card for signal `signal` with one transfer factor per bin.
    pub fn render(&self, signal: usize, transfer: &[Estimate]) -> Result<String> {
        self.validate()?;
        let sig = self.signals.get(signal).ok_or_else(|| {
            Error::Validation(format!("signal index {} out of range ({})", signal, self.signals.len()))
        })?;
        if transfer.len() != self.bins.len() {
            return Err(Error::Validation(format!(
                "{} transfer factors for {} bins",
                transfer.len(),
                self.bins.len()
            )));
        }
        if let Some((b, _)) = self.bins.iter().zip(transfer).find(|(_, tf)| !tf.is_constrained()) {
            return Err(Error::Validation(format!(
                "datacard bin '{}': control region is empty, transfer factor is unconstrained",
                b.name
            )));
        }
        let channels = self.channels()?;
        let sig_yields = sig.yields.iter().map(YieldEntry::to_gamma).collect::<Result<Vec<_>>>()?;

        let nbins = channels.len();
        let nbg = self.backgrounds.len();
        let ncol = (nbg + 1) * nbins;
        let nsyst = 3 + nbins + nbg * nbins;
        let w_bin = channels.iter().map(|c| c.name.len()).max().unwrap_or(0).max(W_BIN_MIN) + 1;
        let f2 = |x: f64| format!("{x:.2}");
        let syst = &self.systematics;

        let mut lines: Vec<String> = vec![
            format!("imax {nbins}  number of channels"),
            format!("jmax {nbg}  number of backgrounds"),
            format!("kmax {nsyst}  number of nuisance parameters"),
            "shapes * * FAKE".to_string(),
            String::new(),
        ];

        let label = name_label("bin");
        lines.push(row(&label, w_bin, channels.iter().map(|c| c.name.to_string())));

        let observation = channels.iter().zip(&sig_yields).map(|(c, s)| {
            let bkg: f64 = c.sr.iter().map(GammaParams::yield_).sum();
            f2(if self.discovery_mode { bkg + s.yield_() } else { bkg })
        });
        let label = name_label("observation");
        lines.push(row(&label, w_bin, observation));
        lines.push(String::new());

        let label = name_label("bin");
        let names = channels.iter().flat_map(|c| std::iter::repeat(c.name.to_string()).take(nbg + 1));
        lines.push(row(&label, w_bin, names));

        let label = name_label("process");
        let procs = (0..nbins).flat_map(|_| std::iter::once("sig".to_string()).chain(self.backgrounds.iter().cloned()));
        lines.push(row(&label, w_bin, procs));
        lines.push(row(&label, w_bin, (0..nbins).flat_map(|_| (0..=nbg).map(|k| k.to_string()))));

        let label = name_label("rate");
        let rates = channels.iter().zip(&sig_yields).flat_map(|(c, s)| {
            std::iter::once(f2(s.yield_())).chain(c.sr.iter().map(|g| f2(g.yield_())))
        });
        lines.push(row(&label, w_bin, rates));
        lines.push(String::new());

        let lnn = |name: &str| {
            format!("{:<ws$}{:<wt$}{:<wd$}", name, "lnN", " ", ws = W_SYST, wt = W_SYST_TYPE, wd = W_DIST)
        };
        // The extrapolated background carries no luminosity uncertainty.
        let per_bin = |cells: Vec<String>| (0..nbins).flat_map(move |_| cells.clone());
        let mut lumi = vec![f2(syst.lumi), "-".to_string()];
        lumi.extend((1..nbg).map(|_| f2(syst.lumi)));
        lines.push(row(&lnn("lumi"), w_bin, per_bin(lumi)));
        let mut bkg_flat = vec!["-".to_string()];
        bkg_flat.extend((0..nbg).map(|_| f2(syst.bkg_flat)));
        lines.push(row(&lnn("bkg_flat"), w_bin, per_bin(bkg_flat)));
        let mut sig_flat = vec![f2(syst.sig_flat)];
        sig_flat.extend((0..nbg).map(|_| "-".to_string()));
        lines.push(row(&lnn("sig_flat"), w_bin, per_bin(sig_flat)));

        for (i, (c, tf)) in channels.iter().zip(transfer).enumerate() {
            let name = format!("{}_CR_stat{} gmN {:.0}", self.cr_stat_prefix, 2 * i, c.cr_total.yield_());
            let label = name_label(&name);
            lines.push(row(&label, w_bin, single_column(ncol, 1 + (nbg + 1) * i, format!("{:.3}", tf.value))));
        }
        for i in 0..nbins {
            for k in 1..=nbg {
                let name = format!("bkg_flat{}_proc{k} lnN", 2 * i);
                let label = name_label(&name);
                lines.push(row(&label, w_bin, single_column(ncol, k + (nbg + 1) * i, f2(syst.bkg_flat))));
            }
        }

        let mut out = lines.join("\n");
        out.push_str("\n\n");
        Ok(out)
    }
}

/// Row label padded to the name column plus separator.
fn name_label(name: &str) -> String {
    format!("{:<wn$}{:<wd$}", name, " ", wn = W_NAME, wd = W_DIST)
}

/// `label` followed by every cell left-aligned in a `width` column.
fn row<I: IntoIterator<Item = String>>(label: &str, width: usize, cells: I) -> String {
    let mut s = label.to_string();
    for c in cells {
        let _ = write!(s, "{c:<width$}");
    }
    s
}

/// `ncol` cells, all `-` except `value` at `col`.
fn single_column(ncol: usize, col: usize, value: String) -> impl Iterator<Item = String> {
    (0..ncol).map(move |j| if j == col { value.clone() } else { "-".to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ks_core::EstimateStatus;
    use ks_inference::{PredictionConfig, Sampling, ToyConfig, transfer_factors};

    fn input() -> DatacardInput {
        serde_json::from_str(
            r#"{
          "backgrounds": ["top", "wjets", "other"],
          "bins": [
            {"name": "SR_nj2_met125", "signal_region": [10.5, 2.25, 1.0], "control_region": [30, 8, 2]},
            {"name": "SR_nj3_met125", "signal_region": [4.0, 1.0, 0.5], "control_region": [18, 1, 1]}
          ],
          "signals": [{"name": "TChiWH_700_1", "yields": [3.2, 1.1]}]
        }"#,
        )
        .unwrap()
    }

    fn tfs() -> Vec<Estimate> {
        vec![Estimate::new(0.2625, 0.05, 0.04), Estimate::new(0.2, 0.06, 0.05)]
    }

    #[test]
    fn test_header_and_counts() {
        let card = input().render(0, &tfs()).unwrap();
        let lines: Vec<&str> = card.lines().collect();
        assert_eq!(lines[0], "imax 2  number of channels");
        assert_eq!(lines[1], "jmax 3  number of backgrounds");
        assert_eq!(lines[2], "kmax 11  number of nuisance parameters");
        assert_eq!(lines[3], "shapes * * FAKE");
        assert_eq!(lines[4], "");
        assert!(card.ends_with("\n\n"));
    }

    #[test]
    fn test_column_layout() {
        let card = input().render(0, &tfs()).unwrap();
        let lines: Vec<&str> = card.lines().collect();
        // w_bin = max(12, 13) + 1 = 14
        assert_eq!(lines[5], format!("{:<23}{:<14}{:<14}", "bin", "SR_nj2_met125", "SR_nj3_met125"));
        assert_eq!(lines[6], format!("{:<23}{:<14}{:<14}", "observation", "13.75", "5.50"));
        assert!(lines[9].starts_with(&format!("{:<23}{:<14}{:<14}{:<14}{:<14}{:<14}", "process", "sig", "top", "wjets", "other", "sig")));
        assert!(lines[10].starts_with(&format!("{:<23}{:<14}{:<14}{:<14}{:<14}", "process", "0", "1", "2", "3")));
        assert!(lines[11].starts_with(&format!("{:<23}{:<14}{:<14}{:<14}{:<14}", "rate", "3.20", "10.50", "2.25", "1.00")));
        assert_eq!(lines[12], "");
        assert!(lines[13].starts_with(&format!("{:<14}{:<7}{:<2}{:<14}{:<14}{:<14}", "lumi", "lnN", " ", "1.05", "-", "1.05")));
        assert!(lines[14].starts_with(&format!("{:<23}{:<14}{:<14}", "bkg_flat      lnN", "-", "1.15")));
        assert!(lines[15].starts_with(&format!("{:<23}{:<14}{:<14}", "sig_flat      lnN", "1.15", "-")));
    }

    #[test]
    fn test_gmn_and_uncorrelated_rows() {
        let card = input().render(0, &tfs()).unwrap();
        let lines: Vec<&str> = card.lines().collect();
        let cells = |line: &str| line[23..].split_whitespace().map(str::to_string).collect::<Vec<_>>();

        assert!(lines[16].starts_with("mCT_CR_stat0 gmN 40"));
        let c0 = cells(lines[16]);
        assert_eq!(c0.len(), 8);
        assert_eq!(c0[1], "0.263");
        assert!(c0.iter().enumerate().all(|(j, v)| j == 1 || v == "-"));

        assert!(lines[17].starts_with("mCT_CR_stat2 gmN 20"));
        assert_eq!(cells(lines[17])[5], "0.200");

        // bkg_flat{2i}_proc{k}: value in column k of bin i.
        assert!(lines[18].starts_with("bkg_flat0_proc1 lnN"));
        assert_eq!(cells(lines[18])[1], "1.15");
        assert!(lines[21].starts_with("bkg_flat2_proc1 lnN"));
        assert!(lines[23].starts_with("bkg_flat2_proc3 lnN"));
        assert_eq!(cells(lines[23])[7], "1.15");
        // Trailing blank line.
        assert_eq!(lines.len(), 25);
        assert_eq!(lines[24], "");
    }

    #[test]
    fn test_discovery_mode_adds_signal() {
        let mut inp = input();
        inp.discovery_mode = true;
        let card = inp.render(0, &tfs()).unwrap();
        let obs = card.lines().nth(6).unwrap();
        assert!(obs.contains("16.95"), "{obs}");
    }

    #[test]
    fn test_transfer_pairs() {
        let pairs = input().transfer_pairs().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].signal_region.yield_(), 10.5);
        assert_eq!(pairs[0].control_region.yield_(), 40.0);
    }

    #[test]
    fn test_invalid_inputs() {
        let mut inp = input();
        inp.bins[0].control_region.pop();
        assert!(inp.validate().is_err());
        assert!(input().render(0, &tfs()[..1]).is_err());
        assert!(input().render(1, &tfs()).is_err());
        assert!(input().signal_index("nope").is_err());
        assert_eq!(input().signal_index("TChiWH_700_1").unwrap(), 0);
        let unconstrained = vec![Estimate::unconstrained(1e10); 2];
        assert_eq!(unconstrained[0].status, EstimateStatus::Unconstrained);
        assert!(input().render(0, &unconstrained).is_err());
    }

    #[test]
    fn test_empty_control_region_is_rejected() {
        let mut inp = input();
        inp.bins[1].control_region = vec![YieldEntry::Count(0.0); 3];
        let config = PredictionConfig { toys: ToyConfig { n_toys: 200, sampling: Sampling::Poisson }, seed: 3 };
        let tfs = transfer_factors(&inp.transfer_pairs().unwrap(), &config).unwrap();
        assert!(tfs[0].is_constrained());
        assert_eq!(tfs[1].status, EstimateStatus::Unconstrained);

        let err = inp.render(0, &tfs).unwrap_err().to_string();
        assert!(err.contains("'SR_nj3_met125'"), "{err}");
        assert!(err.contains("control region is empty"), "{err}");
    }
}
