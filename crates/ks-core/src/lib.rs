//! # ks-core
//!
//! Core types and traits for KappaStat.
//!
//! This crate defines:
//! - the weighted-count accumulator [`GammaParams`],
//! - value-with-asymmetric-errors [`Estimate`] and [`PlaneRatio`],
//! - the [`YieldSource`] seam between the event loop and the estimator,
//! - the shared [`Error`] type.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::YieldSource;
pub use types::{Estimate, EstimateStatus, GammaParams, PlaneRatio, YieldMatrix};

/// KappaStat version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
