//! Counting-experiment significances and ratios used in prediction tables.
//!
//! `zbi` follows Cousins, Linnemann & Tucker (NIM A 595 (2008) 480): the
//! background uncertainty is modelled as an auxiliary "off" measurement with
//! `tau = b / sigma_b^2`, and the p-value is the binomial tail
//! `I_{1/(1+tau)}(n_on, n_off + 1)`.

use ks_core::{Error, Result};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::beta::checked_beta_reg;
use statrs::function::gamma::checked_gamma_lr;

const PROB_EPS: f64 = 1e-300;

#[inline]
fn p_to_z(p: f64) -> Result<f64> {
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| Error::Computation(format!("standard normal: {e}")))?;
    let p = p.clamp(PROB_EPS, 1.0);
    if p >= 1.0 {
        return Ok(0.0);
    }
    Ok(normal.inverse_cdf(1.0 - p).max(0.0))
}

/// Poisson tail probability `P(N >= n_obs | b)` for a perfectly known background.
pub fn poisson_p_value(n_obs: f64, n_bkg: f64) -> Result<f64> {
    if n_obs <= 0.0 {
        return Ok(1.0);
    }
    if n_bkg <= 0.0 {
        return Ok(0.0);
    }
    // P(N >= n) = P(n, b), the regularized lower incomplete gamma.
    checked_gamma_lr(n_obs, n_bkg).map_err(|e| Error::Computation(format!("gamma_lr: {e}")))
}

/// Z_Bi significance of `n_obs` against a background `n_bkg ± err_bkg`.
///
/// Returns 0 for deficits, empty observations and non-positive backgrounds;
/// falls back to the Poisson tail when `err_bkg` is 0.
pub fn zbi(n_obs: f64, n_bkg: f64, err_bkg: f64) -> Result<f64> {
    if ![n_obs, n_bkg, err_bkg].iter().all(|x| x.is_finite()) {
        return Err(Error::Validation(format!(
            "zbi inputs must be finite, got n_obs={n_obs} n_bkg={n_bkg} err_bkg={err_bkg}"
        )));
    }
    if n_obs <= n_bkg || n_bkg <= 0.0 {
        return Ok(0.0);
    }
    if err_bkg <= 0.0 {
        return p_to_z(poisson_p_value(n_obs, n_bkg)?);
    }
    let tau = n_bkg / (err_bkg * err_bkg);
    let n_off = tau * n_bkg;
    let x = 1.0 / (1.0 + tau);
    let p = checked_beta_reg(n_obs, n_off + 1.0, x)
        .map_err(|e| Error::Computation(format!("beta_reg: {e}")))?;
    p_to_z(p)
}

/// Observed/simulated ratio with `sqrt((e_obs/n_mc)^2 + (n_obs*e_mc/n_mc^2)^2)`.
///
/// `e_obs = sqrt(n_obs)`, or 1 for an empty observation. Returns `None` when the
/// simulated uncertainty or yield is not positive.
pub fn ratio_with_error(n_obs: f64, n_mc: f64, e_mc: f64) -> Option<(f64, f64)> {
    if e_mc <= 0.0 || n_mc <= 0.0 {
        return None;
    }
    let e_obs = if n_obs == 0.0 { 1.0 } else { n_obs.max(0.0).sqrt() };
    let ratio = n_obs / n_mc;
    let err = (e_obs / n_mc).hypot(n_obs * e_mc / (n_mc * n_mc));
    Some((ratio, err))
}
