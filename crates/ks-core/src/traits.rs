//! Core traits for KappaStat
//!
//! The estimator never scans events itself: yields are produced by an
//! external event loop and handed over through [`YieldSource`]. Anything that
//! can expose a `[process][flat region]` table of [`GammaParams`] can feed
//! the predictor.

use crate::{GammaParams, Result};

/// A `[process][flat region]` table of accumulated yields.
///
/// Process 0 is observed data, process 1 the total simulated background;
/// further processes (signals, background components) are optional.
pub trait YieldSource {
    /// Number of processes (rows).
    fn n_processes(&self) -> usize;

    /// Number of flat regions per process.
    fn n_regions(&self) -> usize;

    /// Yields of one process.
    fn process(&self, process: usize) -> Result<&[GammaParams]>;

    /// Mutable yields of one process (used to renormalize simulation in place).
    fn process_mut(&mut self, process: usize) -> Result<&mut [GammaParams]>;
}
