//! Small numerically-stable math utilities used across probability code.

/// Exponential with a conservative clamp to avoid overflow.
///
/// For `x > 700`, `exp(x)` can overflow to `inf` on some platforms. Products of
/// many yields raised to signed powers are evaluated in log space and brought
/// back through this function so a single huge ratio stays finite.
#[inline]
pub fn exp_clamped(x: f64) -> f64 {
    x.clamp(-700.0, 700.0).exp()
}

/// Outcome of `prod_i x_i^p_i` for non-negative `x_i`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerProduct {
    /// Finite, strictly positive product.
    Finite(f64),
    /// A zero factor with a positive power and no zero denominator.
    Zero,
    /// A zero (or negative) factor sits in a denominator.
    Unbounded,
}

impl PowerProduct {
    /// Numeric value, mapping [`PowerProduct::Unbounded`] to `saturated`.
    pub fn value_or(self, saturated: f64) -> f64 {
        match self {
            PowerProduct::Finite(v) => v,
            PowerProduct::Zero => 0.0,
            PowerProduct::Unbounded => saturated,
        }
    }
}

/// `prod_i values[i]^powers[i]`, accumulated as `sum_i powers[i] * ln(values[i])`.
///
/// Factors with power 0 are ignored. Non-positive values in a denominator make
/// the product unbounded; non-positive values in a numerator make it zero.
/// `values` and `powers` must have the same length (extra entries are ignored).
pub fn power_product(values: &[f64], powers: &[i32]) -> PowerProduct {
    let mut log_sum = 0.0;
    let mut zero = false;
    for (&x, &p) in values.iter().zip(powers) {
        if p == 0 {
            continue;
        }
        if x.is_nan() || x <= 0.0 {
            if p < 0 {
                return PowerProduct::Unbounded;
            }
            zero = true;
            continue;
        }
        log_sum += p as f64 * x.ln();
    }
    if zero { PowerProduct::Zero } else { PowerProduct::Finite(exp_clamped(log_sum)) }
}
