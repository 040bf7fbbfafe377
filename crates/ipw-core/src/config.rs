//! Pipeline configuration.
//!
//! Loaded from JSON by the CLI (`ipwstat run --config`); every field has a
//! default so a partial file only overrides what it names.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Covariate, Error, Result, Term};

/// Sandwich variance flavour for the weighted effect estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceEstimator {
    /// `B⁻¹ M B⁻¹` with no small-sample correction.
    #[default]
    Hc0,
    /// HC0 scaled by `n / (n - k)`.
    Hc1,
}

/// Input table column names for the non-covariate fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    /// Subject identifier column.
    pub id: String,
    /// Binary treatment indicator column.
    pub treatment: String,
    /// Numeric outcome column.
    pub outcome: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self { id: "seqn".into(), treatment: "qsmk".into(), outcome: "wt82_71".into() }
    }
}

/// Full configuration of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Propensity model regressors (an intercept is always added).
    pub terms: Vec<Term>,
    /// Multiply raw weights by the marginal treatment probability.
    pub stabilize: bool,
    /// Relative log-likelihood change that ends the IRLS loop.
    pub convergence_tolerance: f64,
    /// IRLS iteration budget.
    pub max_iterations: usize,
    /// Two-sided confidence level of the reported interval.
    pub confidence_level: f64,
    /// Sandwich variance flavour.
    pub variance: VarianceEstimator,
    /// Extra regressors in the weighted outcome model besides treatment.
    pub adjustment: Vec<Term>,
    /// Input table column names.
    pub columns: ColumnMap,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            terms: Self::nhefs_terms(),
            stabilize: false,
            convergence_tolerance: 1e-8,
            max_iterations: 25,
            confidence_level: 0.95,
            variance: VarianceEstimator::Hc0,
            adjustment: Vec::new(),
            columns: ColumnMap::default(),
        }
    }
}

impl PipelineConfig {
    /// Propensity model used for the NHEFS smoking-cessation analysis:
    /// quadratic in the continuous covariates, categorical in the ordinal ones.
    pub fn nhefs_terms() -> Vec<Term> {
        use Covariate::*;
        vec![
            Term::Linear(Sex),
            Term::Linear(Race),
            Term::Linear(Age),
            Term::Quadratic(Age),
            Term::Categorical(Education),
            Term::Linear(SmokeIntensity),
            Term::Quadratic(SmokeIntensity),
            Term::Linear(SmokeYears),
            Term::Quadratic(SmokeYears),
            Term::Categorical(Exercise),
            Term::Categorical(Active),
            Term::Linear(BaselineWeight),
            Term::Quadratic(BaselineWeight),
        ]
    }

    /// Read a JSON configuration file and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check numeric settings and reject duplicate terms.
    pub fn validate(&self) -> Result<()> {
        if !(self.convergence_tolerance.is_finite() && self.convergence_tolerance > 0.0) {
            return Err(Error::Validation(format!(
                "convergence_tolerance must be finite and > 0, got {}",
                self.convergence_tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::Validation("max_iterations must be >= 1".into()));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(Error::Validation(format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            )));
        }
        for (name, terms) in [("terms", &self.terms), ("adjustment", &self.adjustment)] {
            for (i, t) in terms.iter().enumerate() {
                if terms[..i].contains(t) {
                    return Err(Error::Validation(format!("duplicate entry {:?} in {}", t, name)));
                }
            }
        }
        Ok(())
    }
}
