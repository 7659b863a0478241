//! # ks-inference
//!
//! ABCD background estimation for KappaStat.
//!
//! This crate provides:
//! - the toy-based product/ratio estimator (`calc_kappa`)
//! - the region-plane definition of an ABCD method and its flat row index
//! - per-(plane, bin) kappas and background predictions (`find_preds`)
//! - SR/CR transfer factors for datacards
//!
//! ## Architecture
//!
//! Yields come in through the `YieldSource` trait from ks-core; nothing here
//! knows how they were produced.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Toy-based product/ratio estimator with asymmetric errors.
pub mod kappa;
/// Region planes, quadrants and flat row indexing.
pub mod plane;
/// Plane normalization, kappas and predictions.
pub mod preds;
/// Signal-region/control-region transfer factors.
pub mod transfer;

pub use kappa::{
    DEFAULT_N_TOYS, KappaResult, RegionTerm, SATURATED_VALUE, Sampling, ToyConfig, WeightedEntry,
    calc_kappa,
};
pub use plane::{AbcdMethod, Quadrant, RegionIndex};
pub use preds::{
    DEFAULT_SEED, POW_KAPPA, POW_TOTAL_PRED, PredictionConfig, Predictions, find_preds, plane_ratio,
    stream_seed,
};
pub use transfer::{POW_TRANSFER, TransferPair, transfer_factor, transfer_factors};
