//! # ks-translate
//!
//! File formats for KappaStat.
//!
//! Supports:
//! - analysis configs (YAML or JSON): run options and ABCD method catalogue
//! - yield tables (JSON) produced by an external event loop
//! - counting-experiment datacards for the statistical fitting tool

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod datacard;
pub mod yields;

pub use config::{AnalysisConfig, AnalysisOptions, BinSpec, MethodConfig};
pub use datacard::{DatacardBin, DatacardInput, FlatSystematics, SignalPoint};
pub use yields::{LoadedYields, ProcessLabel, ProcessRole, ProcessYields, YieldEntry, YieldsFile};
