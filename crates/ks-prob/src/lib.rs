//! Probability building blocks for KappaStat.
//!
//! This crate hosts reusable probability math used by the estimator:
//! - count fluctuations for toys (Poisson, flat-prior Gamma posterior)
//! - empirical quantiles of toy ensembles
//! - counting-experiment significances (Z_Bi) and ratio errors
//! - small numeric helpers (clamped exp, signed power products)

pub mod math;
pub mod poisson;
pub mod quantile;
pub mod significance;
