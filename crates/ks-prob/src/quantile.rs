//! Empirical quantiles of toy ensembles.

/// Lower edge of the central 68.27 % interval, `Phi(-1)`.
pub const ONE_SIGMA_LOW: f64 = 0.158_655_253_931_457_05;
/// Upper edge of the central 68.27 % interval, `Phi(+1)`.
pub const ONE_SIGMA_HIGH: f64 = 0.841_344_746_068_542_9;

/// Quantile for sorted data via linear interpolation.
///
/// - `q=0` returns min
/// - `q=1` returns max
/// - empty input returns `NaN`
pub fn quantile_linear_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let i = pos.floor() as usize;
    let j = pos.ceil() as usize;
    if i == j {
        return sorted[i];
    }
    let t = pos - i as f64;
    (1.0 - t) * sorted[i] + t * sorted[j]
}

/// `(q16, median, q84)` of an already sorted sample.
pub fn one_sigma_band_sorted(sorted: &[f64]) -> (f64, f64, f64) {
    (
        quantile_linear_sorted(sorted, ONE_SIGMA_LOW),
        quantile_linear_sorted(sorted, 0.5),
        quantile_linear_sorted(sorted, ONE_SIGMA_HIGH),
    )
}
