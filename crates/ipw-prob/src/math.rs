//! Small numerically-stable math utilities used by the logistic fits.

/// Stable `log(1 + exp(x))`.
///
/// `log(1+exp(x)) = max(x,0) + log(1+exp(-|x|))`, a single `exp(-|x|)` that
/// never overflows.
#[inline]
pub fn log1pexp(x: f64) -> f64 {
    let e = (-x.abs()).exp();
    x.max(0.0) + e.ln_1p()
}

/// Stable sigmoid: `1 / (1 + exp(-x))`.
///
/// Saturates to exactly `0.0` / `1.0` for large `|x|`; callers that need an
/// open interval must check.
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    let e = (-x.abs()).exp();
    let recip = 1.0 / (1.0 + e);
    if x >= 0.0 { recip } else { e * recip }
}

/// Bernoulli log-likelihood contribution `y*eta - log(1+exp(eta))`.
#[inline]
pub fn bernoulli_loglik(y: f64, eta: f64) -> f64 {
    y * eta - log1pexp(eta)
}
