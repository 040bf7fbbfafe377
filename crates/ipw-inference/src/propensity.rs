//! Propensity model: logistic regression of the treatment indicator on
//! baseline covariates, fitted by iteratively reweighted least squares.
//!
//! Each IRLS step is a Newton step on the Bernoulli log-likelihood,
//! `β ← β + (XᵀWX)⁻¹ Xᵀ(y − μ)` with `W = diag(μ(1 − μ))`, halved while it
//! fails to increase the likelihood. The loop stops once the relative
//! log-likelihood change `|ℓₖ − ℓₖ₋₁| / (|ℓₖ| + 0.1)` drops below the
//! tolerance.

use std::fmt;

use ipw_core::{Dataset, Error, PipelineConfig, PropensityScores, Result, Stage, Term};
use ipw_prob::math::{bernoulli_loglik, sigmoid};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::design::{DesignSpec, ensure_full_rank, weighted_gram};

const MAX_HALVINGS: usize = 30;

/// Logistic regression settings for the propensity score.
#[derive(Debug, Clone)]
pub struct PropensityModel {
    terms: Vec<Term>,
    tolerance: f64,
    max_iterations: usize,
}

impl PropensityModel {
    /// Model with the given regressors and default convergence settings
    /// (tolerance `1e-8`, 25 iterations).
    pub fn new(terms: Vec<Term>) -> Self {
        Self { terms, tolerance: 1e-8, max_iterations: 25 }
    }

    /// Model as described by a pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.terms.clone())
            .with_tolerance(config.convergence_tolerance)
            .with_max_iterations(config.max_iterations)
    }

    /// Relative log-likelihood change that counts as converged.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// IRLS iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Fit on `data` and return the model together with the in-sample scores.
    pub fn fit(&self, data: &Dataset) -> Result<(FittedModel, PropensityScores)> {
        let design = DesignSpec::learn(data, &self.terms, Stage::PropensityModel)?;
        let x = design.build(data, Stage::PropensityModel)?;
        ensure_full_rank(&x, None, design.names(), Stage::PropensityModel)?;

        let y: Vec<f64> = data.treated().into_iter().map(|t| if t { 1.0 } else { 0.0 }).collect();
        let fit = irls_logistic(&x, &y, self.tolerance, self.max_iterations)?;
        let std_errors =
            (0..fit.beta.len()).map(|j| fit.covariance[(j, j)].max(0.0).sqrt()).collect();

        let model = FittedModel {
            names: design.names().to_vec(),
            coefficients: fit.beta.iter().copied().collect(),
            std_errors,
            log_likelihood: fit.log_likelihood,
            iterations: fit.iterations,
            n_obs: data.len(),
            design,
        };
        let scores = model.scores_from_design(&x)?;
        tracing::info!(
            n = data.len(),
            iterations = model.iterations,
            log_likelihood = model.log_likelihood,
            n_degenerate = scores.n_degenerate(),
            "propensity model fit"
        );
        Ok((model, scores))
    }
}

/// Result of a propensity model fit. Read-only.
#[derive(Debug, Clone, Serialize)]
pub struct FittedModel {
    names: Vec<String>,
    coefficients: Vec<f64>,
    std_errors: Vec<f64>,
    log_likelihood: f64,
    iterations: usize,
    n_obs: usize,
    #[serde(skip)]
    design: DesignSpec,
}

impl FittedModel {
    /// Coefficient names, intercept first.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Maximum-likelihood coefficients.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Model-based standard errors, `sqrt(diag((XᵀWX)⁻¹))`.
    pub fn std_errors(&self) -> &[f64] {
        &self.std_errors
    }

    /// Coefficient by name.
    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.names.iter().position(|n| n == name).map(|j| self.coefficients[j])
    }

    /// Bernoulli log-likelihood at the optimum.
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// IRLS iterations used.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Number of subjects the model was fit on.
    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    /// Predicted treatment probabilities for the subjects of `data`.
    ///
    /// Categorical levels are those seen at fit time.
    pub fn predict(&self, data: &Dataset) -> Result<PropensityScores> {
        let x = self.design.build(data, Stage::PropensityModel)?;
        self.scores_from_design(&x)
    }

    fn scores_from_design(&self, x: &DMatrix<f64>) -> Result<PropensityScores> {
        let beta = DVector::from_column_slice(&self.coefficients);
        let eta = x * beta;
        if eta.iter().any(|v| !v.is_finite()) {
            return Err(Error::Convergence {
                iterations: self.iterations,
                last_change: f64::NAN,
                log_likelihood: self.log_likelihood,
                coefficients: self.coefficients.clone(),
            });
        }
        PropensityScores::new(eta.iter().map(|&e| sigmoid(e)).collect())
    }
}

impl fmt::Display for FittedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Propensity model: logistic, n = {}, {} iterations, log-likelihood {:.4}",
            self.n_obs, self.iterations, self.log_likelihood
        )?;
        writeln!(f, "{:<22} {:>14} {:>14}", "term", "coef", "std.err")?;
        for ((name, b), se) in self.names.iter().zip(&self.coefficients).zip(&self.std_errors) {
            writeln!(f, "{:<22} {:>14.6} {:>14.6}", name, b, se)?;
        }
        Ok(())
    }
}

/// Probability of treatment from the treatment-only (intercept) logistic model.
///
/// The MLE of an intercept-only logistic model is the logit of the sample
/// proportion, so this equals `n_treated / n` up to the convergence tolerance.
pub fn marginal_treatment_probability(
    treated: &[bool],
    tolerance: f64,
    max_iterations: usize,
) -> Result<f64> {
    if treated.is_empty() {
        return Err(Error::data(Stage::WeightCalculator, "treatment vector is empty"));
    }
    let n_treated = treated.iter().filter(|&&t| t).count();
    if n_treated == 0 || n_treated == treated.len() {
        return Err(Error::data(
            Stage::WeightCalculator,
            "treatment is constant; marginal treatment probability is 0 or 1",
        ));
    }
    let x = DMatrix::from_element(treated.len(), 1, 1.0);
    let y: Vec<f64> = treated.iter().map(|&t| if t { 1.0 } else { 0.0 }).collect();
    let fit = irls_logistic(&x, &y, tolerance, max_iterations)?;
    Ok(sigmoid(fit.beta[0]))
}

pub(crate) struct IrlsFit {
    pub(crate) beta: DVector<f64>,
    pub(crate) covariance: DMatrix<f64>,
    pub(crate) log_likelihood: f64,
    pub(crate) iterations: usize,
}

fn log_likelihood(x: &DMatrix<f64>, y: &[f64], beta: &DVector<f64>) -> f64 {
    let eta = x * beta;
    eta.iter().zip(y).map(|(&e, &yi)| bernoulli_loglik(yi, e)).sum()
}

/// Newton/IRLS fit of a logistic regression on a prepared design.
pub(crate) fn irls_logistic(
    x: &DMatrix<f64>,
    y: &[f64],
    tolerance: f64,
    max_iterations: usize,
) -> Result<IrlsFit> {
    let (n, d) = x.shape();
    debug_assert_eq!(y.len(), n);

    let mut beta = DVector::zeros(d);
    let mut ll = log_likelihood(x, y, &beta);
    let mut last_change = f64::INFINITY;

    for iter in 1..=max_iterations {
        let eta = x * &beta;
        let mu: Vec<f64> = eta.iter().map(|&e| sigmoid(e)).collect();
        let w: Vec<f64> = mu.iter().map(|&m| m * (1.0 - m)).collect();
        let resid = DVector::from_iterator(n, y.iter().zip(&mu).map(|(&yi, &mi)| yi - mi));
        let score = x.transpose() * resid;

        let chol = weighted_gram(x, &w).cholesky().ok_or_else(|| {
            Error::singular(
                Stage::PropensityModel,
                format!("information matrix is not positive definite at iteration {}", iter),
            )
        })?;
        let step = chol.solve(&score);

        let mut scale = 1.0;
        let mut candidate = &beta + &step;
        let mut ll_new = log_likelihood(x, y, &candidate);
        let mut halvings = 0;
        while !(ll_new.is_finite() && ll_new >= ll - 1e-12 * ll.abs()) && halvings < MAX_HALVINGS {
            scale *= 0.5;
            candidate = &beta + &step * scale;
            ll_new = log_likelihood(x, y, &candidate);
            halvings += 1;
        }
        if !ll_new.is_finite() {
            return Err(Error::Convergence {
                iterations: iter,
                last_change,
                log_likelihood: ll_new,
                coefficients: candidate.iter().copied().collect(),
            });
        }

        last_change = (ll_new - ll).abs() / (ll_new.abs() + 0.1);
        beta = candidate;
        ll = ll_new;
        tracing::debug!(
            iteration = iter,
            log_likelihood = ll,
            change = last_change,
            halvings,
            "irls step"
        );

        if last_change < tolerance {
            let w: Vec<f64> = (x * &beta)
                .iter()
                .map(|&e| {
                    let m = sigmoid(e);
                    m * (1.0 - m)
                })
                .collect();
            let covariance =
                weighted_gram(x, &w).cholesky().map(|c| c.inverse()).ok_or_else(|| {
                    Error::singular(
                        Stage::PropensityModel,
                        "information matrix at the optimum is singular",
                    )
                })?;
            return Ok(IrlsFit { beta, covariance, log_likelihood: ll, iterations: iter });
        }
    }

    Err(Error::Convergence {
        iterations: max_iterations,
        last_change,
        log_likelihood: ll,
        coefficients: beta.iter().copied().collect(),
    })
}
