//! Analysis configuration: run options and the ABCD method catalogue.
//!
//! YAML by default, JSON when the file extension is `.json`:
//!
//! ```yaml
//! options:
//!   n_toys: 10000
//!   seed: 1234
//!   unblind: false
//! methods:
//!   - name: signal
//!     planes: ["met>200&&met<=350", "met>350&&met<=500", "met>500"]
//!     bins: ["nb==1&&nj<=8", "nb==1&&nj>=9"]
//!     quadrants: ["mt<=140&&mj<=400", "mt<=140&&mj>400", "mt>140&&mj<=400", "mt>140&&mj>400"]
//!     first_signal_bin: 1
//! ```

use ks_core::{Error, Result};
use ks_inference::{AbcdMethod, PredictionConfig, Sampling, ToyConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Run options shared by every method of a config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Toys per estimate.
    #[serde(default = "default_n_toys")]
    pub n_toys: usize,
    /// Base seed of the per-estimate RNG streams.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Count fluctuation model for toys.
    #[serde(default)]
    pub sampling: Sampling,
    /// Report observed R4 yields and data kappas in signal planes.
    #[serde(default)]
    pub unblind: bool,
    /// Use the simulated background as pseudodata.
    #[serde(default)]
    pub only_mc: bool,
    /// Keep signal processes from the yields file.
    #[serde(default = "default_true")]
    pub do_signal: bool,
    /// Keep background component breakdown from the yields file.
    #[serde(default)]
    pub split_bkg: bool,
}

fn default_n_toys() -> usize {
    ks_inference::DEFAULT_N_TOYS
}

fn default_seed() -> u64 {
    ks_inference::DEFAULT_SEED
}

fn default_true() -> bool {
    true
}

fn default_rd_letter() -> char {
    'R'
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            n_toys: default_n_toys(),
            seed: default_seed(),
            sampling: Sampling::default(),
            unblind: false,
            only_mc: false,
            do_signal: true,
            split_bkg: false,
        }
    }
}

impl AnalysisOptions {
    /// Toy and seed settings for [`ks_inference::find_preds`].
    pub fn prediction_config(&self) -> PredictionConfig {
        PredictionConfig {
            toys: ToyConfig { n_toys: self.n_toys, sampling: self.sampling },
            seed: self.seed,
        }
    }
}

/// Bin cuts: one list for every plane, or one list per plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinSpec {
    /// Same bins in every plane.
    Shared(Vec<String>),
    /// Bins per plane.
    PerPlane(Vec<Vec<String>>),
}

/// One ABCD method as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodConfig {
    /// Unique name.
    pub name: String,
    /// Plane cuts.
    pub planes: Vec<String>,
    /// Bin cuts.
    pub bins: BinSpec,
    /// The four quadrant cuts, in R1..R4 order.
    pub quadrants: Vec<String>,
    /// First blinded plane.
    #[serde(default)]
    pub first_signal_bin: Option<usize>,
    /// Integrate R1/R3 over bins.
    #[serde(default = "default_true")]
    pub int_nbnj: bool,
    /// Split by lepton flavor.
    #[serde(default)]
    pub split_leptons: bool,
    /// Report caption.
    #[serde(default)]
    pub caption: String,
    /// Report title (defaults to the name).
    #[serde(default)]
    pub title: Option<String>,
    /// `R` or `D`.
    #[serde(default = "default_rd_letter")]
    pub rd_letter: char,
}

impl MethodConfig {
    /// Build the validated region-plane definition.
    pub fn build(&self) -> Result<AbcdMethod> {
        if !matches!(self.rd_letter, 'R' | 'D') {
            return Err(Error::Validation(format!(
                "method '{}': rd_letter must be 'R' or 'D', got '{}'",
                self.name, self.rd_letter
            )));
        }
        let method = match &self.bins {
            BinSpec::Shared(bins) => AbcdMethod::with_shared_bins(
                self.name.clone(),
                self.planes.clone(),
                bins.clone(),
                self.quadrants.clone(),
            )?,
            BinSpec::PerPlane(bins) => AbcdMethod::new(
                self.name.clone(),
                self.planes.clone(),
                bins.clone(),
                self.quadrants.clone(),
            )?,
        };
        let method = method
            .with_first_signal_bin(self.first_signal_bin)?
            .with_int_nbnj(self.int_nbnj)
            .with_split_leptons(self.split_leptons)
            .with_caption(self.caption.clone())
            .with_rd_letter(self.rd_letter);
        Ok(match &self.title {
            Some(t) => method.with_title(t.clone()),
            None => method,
        })
    }
}

/// Top-level analysis config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Run options.
    #[serde(default)]
    pub options: AnalysisOptions,
    /// Method catalogue.
    pub methods: Vec<MethodConfig>,
}

impl AnalysisConfig {
    /// Read a config file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
        let cfg: Self = if ext == "json" {
            serde_json::from_slice(&bytes)?
        } else {
            serde_yaml_ng::from_slice(&bytes)?
        };
        cfg.validate()?;
        tracing::debug!(path = %path.display(), methods = cfg.methods.len(), "loaded analysis config");
        Ok(cfg)
    }

    /// Parse YAML text.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_yaml_ng::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check names are unique, every method builds and the options are usable.
    pub fn validate(&self) -> Result<()> {
        if self.methods.is_empty() {
            return Err(Error::Validation("analysis config defines no methods".to_string()));
        }
        if self.options.n_toys < 2 {
            return Err(Error::Validation(format!(
                "options.n_toys must be at least 2, got {}",
                self.options.n_toys
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for m in &self.methods {
            if !seen.insert(m.name.as_str()) {
                return Err(Error::Validation(format!("duplicate method name '{}'", m.name)));
            }
            m.build()?;
        }
        Ok(())
    }

    /// Method names in file order.
    pub fn method_names(&self) -> Vec<&str> {
        self.methods.iter().map(|m| m.name.as_str()).collect()
    }

    /// Look a method up by name.
    pub fn method(&self, name: &str) -> Result<&MethodConfig> {
        self.methods.iter().find(|m| m.name == name).ok_or_else(|| {
            Error::Validation(format!(
                "unknown method '{}' (available: {})",
                name,
                self.method_names().join(", ")
            ))
        })
    }

    /// Build every method.
    pub fn build_methods(&self) -> Result<Vec<AbcdMethod>> {
        self.methods.iter().map(MethodConfig::build).collect()
    }
}
