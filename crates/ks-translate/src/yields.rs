//! Yield tables produced by the external event loop.
//!
//! A yields file lists processes with a role and one entry per flat region
//! of a method (see [`AbcdMethod::index_bin`] for the row order). Entries are
//! either plain counts or weighted accumulators:
//!
//! ```json
//! {
//!   "method": "signal",
//!   "processes": [
//!     {"name": "data", "role": "data", "yields": [200, 80, 40, 100]},
//!     {"name": "bkg", "role": "background",
//!      "yields": [{"raw": 1200, "sumw": 198.0, "sumw2": 190.0}, ...]}
//!   ]
//! }
//! ```

use ks_core::{Error, GammaParams, Result, YieldMatrix};
use ks_inference::AbcdMethod;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::AnalysisOptions;

/// What a process row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessRole {
    /// Observed data.
    Data,
    /// Total simulated background.
    Background,
    /// A signal hypothesis.
    Signal,
    /// One component of the background breakdown.
    Component,
}

/// One region entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YieldEntry {
    /// Unweighted count.
    Count(f64),
    /// Weighted accumulator.
    Weighted {
        /// Raw entries.
        raw: u64,
        /// Sum of weights.
        sumw: f64,
        /// Sum of squared weights.
        sumw2: f64,
    },
}

impl YieldEntry {
    /// Convert to an accumulator, rejecting negative or non-finite inputs.
    pub fn to_gamma(&self) -> Result<GammaParams> {
        match *self {
            YieldEntry::Count(n) => {
                if !n.is_finite() || n < 0.0 {
                    return Err(Error::Validation(format!("invalid count {n}")));
                }
                Ok(GammaParams::new(n.round() as u64, n, n))
            }
            YieldEntry::Weighted { raw, sumw, sumw2 } => {
                if !sumw.is_finite() || !sumw2.is_finite() || sumw2 < 0.0 {
                    return Err(Error::Validation(format!(
                        "invalid weighted entry (raw={raw}, sumw={sumw}, sumw2={sumw2})"
                    )));
                }
                // A non-zero yield always carries a non-zero sum of squared weights.
                if sumw2 == 0.0 && sumw != 0.0 {
                    return Err(Error::Validation(format!(
                        "weighted entry has yield {sumw} but sumw2 = 0 (raw={raw})"
                    )));
                }
                Ok(GammaParams::new(raw, sumw, sumw2))
            }
        }
    }
}

/// One process row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessYields {
    /// Process name.
    pub name: String,
    /// Role.
    pub role: ProcessRole,
    /// One entry per flat region.
    pub yields: Vec<YieldEntry>,
}

/// Yields file contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldsFile {
    /// Method the rows are laid out for.
    pub method: String,
    /// Process rows.
    pub processes: Vec<ProcessYields>,
}

/// Label of one matrix row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessLabel {
    /// Process name.
    pub name: String,
    /// Role.
    pub role: ProcessRole,
}

/// A yield matrix ready for [`ks_inference::find_preds`], with row labels.
///
/// Row 0 is data (or pseudodata), row 1 the total background, then signals
/// and components in file order as enabled by the options.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedYields {
    /// `[process][flat region]`.
    pub matrix: YieldMatrix,
    /// Labels, aligned with matrix rows.
    pub labels: Vec<ProcessLabel>,
}

impl LoadedYields {
    /// Matrix row indices with the given role.
    pub fn rows_with_role(&self, role: ProcessRole) -> Vec<usize> {
        self.labels.iter().enumerate().filter(|(_, l)| l.role == role).map(|(i, _)| i).collect()
    }
}

impl YieldsFile {
    /// Read a JSON yields file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn single(&self, role: ProcessRole) -> Result<Option<&ProcessYields>> {
        let mut it = self.processes.iter().filter(|p| p.role == role);
        let first = it.next();
        if let Some(second) = it.next() {
            return Err(Error::Validation(format!(
                "yields for '{}': more than one {:?} process ('{}' and '{}')",
                self.method,
                role,
                first.map_or("", |p| p.name.as_str()),
                second.name
            )));
        }
        Ok(first)
    }

    /// Validate against `method` and assemble the matrix.
    pub fn to_matrix(&self, method: &AbcdMethod, options: &AnalysisOptions) -> Result<LoadedYields> {
        if self.method != method.name() {
            return Err(Error::Validation(format!(
                "yields were produced for method '{}', not '{}'",
                self.method,
                method.name()
            )));
        }
        let n = method.total_rows();
        let convert = |p: &ProcessYields| -> Result<Vec<GammaParams>> {
            if p.yields.len() != n {
                return Err(Error::Validation(format!(
                    "process '{}' has {} entries, method '{}' defines {} regions",
                    p.name,
                    p.yields.len(),
                    method.name(),
                    n
                )));
            }
            p.yields
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    e.to_gamma().map_err(|err| {
                        Error::Validation(format!("process '{}', region {}: {}", p.name, i, err))
                    })
                })
                .collect()
        };

        let bkg = self.single(ProcessRole::Background)?.ok_or_else(|| {
            Error::Validation(format!("yields for '{}': no background process", self.method))
        })?;
        let bkg_rows = convert(bkg)?;

        let (data_label, data_rows) = if options.only_mc {
            tracing::info!(method = method.name(), "using simulated background as pseudodata");
            (ProcessLabel { name: format!("{} (pseudodata)", bkg.name), role: ProcessRole::Data }, bkg_rows.clone())
        } else {
            let data = self.single(ProcessRole::Data)?.ok_or_else(|| {
                Error::Validation(format!(
                    "yields for '{}': no data process (set only_mc to use simulation as data)",
                    self.method
                ))
            })?;
            (ProcessLabel { name: data.name.clone(), role: ProcessRole::Data }, convert(data)?)
        };

        let mut labels = vec![data_label, ProcessLabel { name: bkg.name.clone(), role: ProcessRole::Background }];
        let mut rows = vec![data_rows, bkg_rows];
        for p in &self.processes {
            let keep = match p.role {
                ProcessRole::Signal => options.do_signal,
                ProcessRole::Component => options.split_bkg,
                ProcessRole::Data | ProcessRole::Background => false,
            };
            if keep {
                rows.push(convert(p)?);
                labels.push(ProcessLabel { name: p.name.clone(), role: p.role });
            }
        }
        Ok(LoadedYields { matrix: YieldMatrix::new(rows)?, labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ks_core::YieldSource;

    fn method() -> AbcdMethod {
        let s = |xs: &[&str]| xs.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        AbcdMethod::with_shared_bins("m", s(&["met>200"]), s(&["nj>=6"]), s(&["a", "b", "c", "d"])).unwrap()
    }

    const JSON: &str = r#"{
      "method": "m",
      "processes": [
        {"name": "data", "role": "data", "yields": [200, 80, 40, 100]},
        {"name": "bkg", "role": "background", "yields": [
          {"raw": 1000, "sumw": 200.0, "sumw2": 196.0}, 80, 40, {"raw": 500, "sumw": 95.0, "sumw2": 100.0}]},
        {"name": "T1tttt(NC)", "role": "signal", "yields": [0, 1, 0.5, 12.5]},
        {"name": "tt1l", "role": "component", "yields": [150, 60, 30, 70]}
      ]
    }"#;

    #[test]
    fn test_matrix_assembly() {
        let file: YieldsFile = serde_json::from_str(JSON).unwrap();
        let loaded = file.to_matrix(&method(), &AnalysisOptions::default()).unwrap();
        assert_eq!(loaded.matrix.n_processes(), 3);
        assert_eq!(loaded.labels[2].name, "T1tttt(NC)");
        assert_eq!(loaded.rows_with_role(ProcessRole::Signal), vec![2]);

        let bkg = loaded.matrix.process(YieldMatrix::BACKGROUND).unwrap();
        assert_relative_eq!(bkg[0].yield_(), 200.0);
        assert_relative_eq!(bkg[0].uncertainty(), 14.0);
        assert_relative_eq!(bkg[1].n_effective(), 80.0);
        let data = loaded.matrix.process(YieldMatrix::DATA).unwrap();
        assert_eq!(data[3].raw(), 100);
    }

    #[test]
    fn test_weighted_entry_validation() {
        assert!(YieldEntry::Weighted { raw: 0, sumw: 0.0, sumw2: 0.0 }.to_gamma().unwrap().is_empty());
        assert!(YieldEntry::Weighted { raw: 3, sumw: 5.0, sumw2: 0.0 }.to_gamma().is_err());
        assert!(YieldEntry::Weighted { raw: 3, sumw: 5.0, sumw2: -1.0 }.to_gamma().is_err());
        // Negative net yields from negative-weight samples are valid input.
        let g = YieldEntry::Weighted { raw: 10, sumw: -0.5, sumw2: 0.3 }.to_gamma().unwrap();
        assert_eq!(g.yield_(), -0.5);
    }

    #[test]
    fn test_options_select_rows() {
        let file: YieldsFile = serde_json::from_str(JSON).unwrap();
        let opts = AnalysisOptions { do_signal: false, split_bkg: true, only_mc: true, ..Default::default() };
        let loaded = file.to_matrix(&method(), &opts).unwrap();
        assert_eq!(loaded.matrix.n_processes(), 3);
        assert_eq!(loaded.labels[2].role, ProcessRole::Component);
        let data = loaded.matrix.process(YieldMatrix::DATA).unwrap();
        let bkg = loaded.matrix.process(YieldMatrix::BACKGROUND).unwrap();
        assert_eq!(data, bkg);
    }

    #[test]
    fn test_shape_and_content_errors() {
        let mut file: YieldsFile = serde_json::from_str(JSON).unwrap();
        file.processes[0].yields.pop();
        assert!(file.to_matrix(&method(), &AnalysisOptions::default()).is_err());

        let mut file: YieldsFile = serde_json::from_str(JSON).unwrap();
        file.processes[0].yields[0] = YieldEntry::Count(-1.0);
        let err = file.to_matrix(&method(), &AnalysisOptions::default()).unwrap_err().to_string();
        assert!(err.contains("region 0"), "{err}");

        let mut file: YieldsFile = serde_json::from_str(JSON).unwrap();
        file.processes[1].yields[2] = YieldEntry::Weighted { raw: 3, sumw: 5.0, sumw2: 0.0 };
        let err = file.to_matrix(&method(), &AnalysisOptions::default()).unwrap_err().to_string();
        assert!(err.contains("process 'bkg', region 2"), "{err}");
        assert!(err.contains("sumw2 = 0"), "{err}");

        let mut file: YieldsFile = serde_json::from_str(JSON).unwrap();
        file.method = "other".to_string();
        assert!(file.to_matrix(&method(), &AnalysisOptions::default()).is_err());

        let mut file: YieldsFile = serde_json::from_str(JSON).unwrap();
        file.processes.remove(0);
        assert!(file.to_matrix(&method(), &AnalysisOptions::default()).is_err());
    }
}
