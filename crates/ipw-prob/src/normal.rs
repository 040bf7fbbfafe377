//! Standard normal utilities for Wald intervals and tests.

use ipw_core::{Error, Result};
use statrs::distribution::{ContinuousCDF, Normal};

fn standard() -> Normal {
    Normal::standard()
}

/// Two-sided critical value `z` with `P(|Z| <= z) = level`.
pub fn critical_value(level: f64) -> Result<f64> {
    if !(level > 0.0 && level < 1.0) {
        return Err(Error::Validation(format!("confidence level must be in (0, 1), got {}", level)));
    }
    Ok(standard().inverse_cdf(0.5 + level / 2.0))
}

/// Two-sided p-value `P(|Z| >= |z|)`.
pub fn two_sided_p_value(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    2.0 * standard().sf(z.abs())
}
