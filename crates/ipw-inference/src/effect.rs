//! Weighted effect estimator: weighted least squares of the outcome on the
//! treatment indicator with sandwich (heteroskedasticity-robust) standard
//! errors.
//!
//! With `B = XᵀWX` and residuals `e = y − Xβ̂`, the robust covariance is
//! `B⁻¹ (Σ wᵢ² eᵢ² xᵢxᵢᵀ) B⁻¹`. The model-based WLS covariance
//! `σ̂² B⁻¹`, `σ̂² = Σ wᵢeᵢ² / (n − k)`, is reported next to it for
//! comparison only; it ignores the sampling variability that estimated
//! weights introduce.
//!
//! # References
//!
//! - Hernán & Robins, *Causal Inference: What If*, Ch. 12.
//! - White (1980), "A heteroskedasticity-consistent covariance matrix estimator."

use std::fmt;

use ipw_core::{Dataset, Error, PipelineConfig, Result, Stage, Term, VarianceEstimator, Weights};
use ipw_prob::normal;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::design::{DesignSpec, ensure_full_rank, weighted_gram};

/// Name of the treatment coefficient in [`EffectEstimate::names`].
pub const TREATMENT_TERM: &str = "treatment";

/// Result of a weighted effect estimation.
#[derive(Debug, Clone, Serialize)]
pub struct EffectEstimate {
    /// Coefficient names: intercept, treatment, then adjustment terms.
    pub names: Vec<String>,
    /// WLS coefficients.
    pub coefficients: Vec<f64>,
    /// Sandwich standard errors.
    pub robust_se: Vec<f64>,
    /// Model-based WLS standard errors.
    pub model_se: Vec<f64>,
    /// Treatment coefficient (the effect estimate).
    pub effect: f64,
    /// Robust standard error of the effect.
    pub std_error: f64,
    /// Confidence level of the interval.
    pub confidence_level: f64,
    /// Interval lower bound.
    pub ci_lower: f64,
    /// Interval upper bound.
    pub ci_upper: f64,
    /// Wald statistic `effect / std_error`.
    pub z: f64,
    /// Two-sided p-value of the Wald statistic.
    pub p_value: f64,
    /// Observations used.
    pub n_obs: usize,
    /// Sum of weights.
    pub sum_weights: f64,
    /// Sandwich flavour used.
    pub variance: VarianceEstimator,
}

impl fmt::Display for EffectEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Effect of treatment: {:.4} (robust SE {:.4}, {:.0}% CI [{:.4}, {:.4}], z = {:.3}, p = {:.3e})",
            self.effect,
            self.std_error,
            self.confidence_level * 100.0,
            self.ci_lower,
            self.ci_upper,
            self.z,
            self.p_value
        )?;
        writeln!(f, "{:<22} {:>14} {:>14} {:>14}", "term", "coef", "robust.se", "model.se")?;
        for (j, name) in self.names.iter().enumerate() {
            writeln!(
                f,
                "{:<22} {:>14.6} {:>14.6} {:>14.6}",
                name, self.coefficients[j], self.robust_se[j], self.model_se[j]
            )?;
        }
        writeln!(f, "n = {}, sum of weights = {:.2}", self.n_obs, self.sum_weights)
    }
}

/// Weighted least squares estimator of the treatment effect.
#[derive(Debug, Clone)]
pub struct WeightedEffectEstimator {
    variance: VarianceEstimator,
    confidence_level: f64,
    adjustment: Vec<Term>,
}

impl Default for WeightedEffectEstimator {
    fn default() -> Self {
        Self { variance: VarianceEstimator::Hc0, confidence_level: 0.95, adjustment: Vec::new() }
    }
}

impl WeightedEffectEstimator {
    /// HC0 sandwich, 95% interval, no adjustment terms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimator as described by a pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            variance: config.variance,
            confidence_level: config.confidence_level,
            adjustment: config.adjustment.clone(),
        }
    }

    /// Sandwich flavour.
    pub fn with_variance(mut self, variance: VarianceEstimator) -> Self {
        self.variance = variance;
        self
    }

    /// Two-sided confidence level in `(0, 1)`.
    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    /// Additional covariate terms in the outcome model.
    pub fn with_adjustment(mut self, terms: Vec<Term>) -> Self {
        self.adjustment = terms;
        self
    }

    /// Regress `outcome` on `[1, treated]` with `weights`.
    ///
    /// Adjustment terms, if configured, need covariates; use
    /// [`estimate_dataset`](Self::estimate_dataset) for those.
    pub fn estimate(
        &self,
        outcome: &[f64],
        treated: &[bool],
        weights: &Weights,
    ) -> Result<EffectEstimate> {
        if !self.adjustment.is_empty() {
            return Err(Error::Validation(
                "adjustment terms require covariates; call estimate_dataset".into(),
            ));
        }
        let n = outcome.len();
        if treated.len() != n {
            return Err(Error::data(
                Stage::EffectEstimator,
                format!("length mismatch: {} outcomes, {} treatment values", n, treated.len()),
            ));
        }
        let x = DMatrix::from_fn(n, 2, |i, j| if j == 0 || treated[i] { 1.0 } else { 0.0 });
        let names = vec!["intercept".to_string(), TREATMENT_TERM.to_string()];
        self.fit(&x, names, outcome, treated, weights)
    }

    /// Regress the dataset's outcome on treatment plus the adjustment terms.
    pub fn estimate_dataset(&self, data: &Dataset, weights: &Weights) -> Result<EffectEstimate> {
        let treated = data.treated();
        let outcome = data.outcomes();
        if self.adjustment.is_empty() {
            return self.estimate(&outcome, &treated, weights);
        }

        let design = DesignSpec::learn(data, &self.adjustment, Stage::EffectEstimator)?;
        let z = design.build(data, Stage::EffectEstimator)?;
        let n = data.len();
        let d = z.ncols() + 1;
        let x = DMatrix::from_fn(n, d, |i, j| match j {
            0 => 1.0,
            1 => f64::from(u8::from(treated[i])),
            _ => z[(i, j - 1)],
        });
        let mut names = vec!["intercept".to_string(), TREATMENT_TERM.to_string()];
        names.extend(design.names().iter().skip(1).cloned());
        self.fit(&x, names, &outcome, &treated, weights)
    }

    fn fit(
        &self,
        x: &DMatrix<f64>,
        names: Vec<String>,
        y: &[f64],
        treated: &[bool],
        weights: &Weights,
    ) -> Result<EffectEstimate> {
        let (n, k) = x.shape();
        let w = weights.values();
        if w.len() != n {
            return Err(Error::data(
                Stage::EffectEstimator,
                format!("length mismatch: {} outcomes, {} weights", n, w.len()),
            ));
        }
        if let Some(i) = y.iter().position(|v| !v.is_finite()) {
            let detail = format!("outcome at row {} is not finite", i);
            return Err(Error::data(Stage::EffectEstimator, detail));
        }
        if treated.iter().all(|&t| t) || treated.iter().all(|&t| !t) {
            return Err(Error::singular(
                Stage::EffectEstimator,
                "treatment indicator is constant across all weighted subjects",
            ));
        }
        ensure_full_rank(x, Some(w), &names, Stage::EffectEstimator)?;

        let bread = weighted_gram(x, w);
        let chol = bread.cholesky().ok_or_else(|| {
            Error::singular(
                Stage::EffectEstimator,
                "weighted normal equations are not positive definite",
            )
        })?;
        let xty = DVector::from_iterator(
            k,
            (0..k).map(|j| (0..n).map(|i| x[(i, j)] * w[i] * y[i]).sum::<f64>()),
        );
        let beta = chol.solve(&xty);
        let bread_inv = chol.inverse();

        let fitted = x * &beta;
        let resid: Vec<f64> = y.iter().zip(fitted.iter()).map(|(yi, fi)| yi - fi).collect();

        // Meat: Σ (wᵢ eᵢ)² xᵢ xᵢᵀ
        let u2: Vec<f64> = (0..n).map(|i| (w[i] * resid[i]).powi(2)).collect();
        let meat = weighted_gram(x, &u2);
        let mut cov = &bread_inv * meat * &bread_inv;
        if self.variance == VarianceEstimator::Hc1 && n > k {
            cov *= n as f64 / (n - k) as f64;
        }

        let dof = n.saturating_sub(k).max(1) as f64;
        let sigma2 = (0..n).map(|i| w[i] * resid[i] * resid[i]).sum::<f64>() / dof;

        let robust_se: Vec<f64> = (0..k).map(|j| cov[(j, j)].max(0.0).sqrt()).collect();
        let model_se: Vec<f64> =
            (0..k).map(|j| (sigma2 * bread_inv[(j, j)]).max(0.0).sqrt()).collect();

        let effect = beta[1];
        let std_error = robust_se[1];
        let crit = normal::critical_value(self.confidence_level)?;
        let z = effect / std_error;
        let estimate = EffectEstimate {
            names,
            coefficients: beta.iter().copied().collect(),
            robust_se,
            model_se,
            effect,
            std_error,
            confidence_level: self.confidence_level,
            ci_lower: effect - crit * std_error,
            ci_upper: effect + crit * std_error,
            z,
            p_value: normal::two_sided_p_value(z),
            n_obs: n,
            sum_weights: w.iter().sum(),
            variance: self.variance,
        };
        tracing::info!(
            effect = estimate.effect,
            std_error = estimate.std_error,
            ci_lower = estimate.ci_lower,
            ci_upper = estimate.ci_upper,
            "weighted effect estimated"
        );
        Ok(estimate)
    }
}
