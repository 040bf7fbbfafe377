//! Error types for ipwstat

use std::fmt;

use thiserror::Error;

/// Pipeline component an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading the input table.
    Loader,
    /// Logistic regression of treatment on covariates.
    PropensityModel,
    /// Conversion of propensity scores into weights.
    WeightCalculator,
    /// Weighted least squares of outcome on treatment.
    EffectEstimator,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Loader => "loader",
            Stage::PropensityModel => "propensity model",
            Stage::WeightCalculator => "weight calculator",
            Stage::EffectEstimator => "effect estimator",
        };
        f.write_str(s)
    }
}

/// ipwstat error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid argument or configuration value
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or invalid input data
    #[error("[{stage}] data error: {detail}")]
    Data {
        /// Component that rejected the data.
        stage: Stage,
        /// What was wrong.
        detail: String,
    },

    /// Propensity model fit did not converge within the iteration budget.
    ///
    /// Carries the last iterate so the caller can inspect how far the fit got.
    #[error(
        "[propensity model] did not converge after {iterations} iterations \
         (last relative change {last_change:.3e}, log-likelihood {log_likelihood})"
    )]
    Convergence {
        /// Iterations performed.
        iterations: usize,
        /// Relative log-likelihood change at the last iteration.
        last_change: f64,
        /// Log-likelihood at the last iterate.
        log_likelihood: f64,
        /// Coefficients at the last iterate.
        coefficients: Vec<f64>,
    },

    /// A propensity score at 0 or 1 (positivity violation).
    #[error(
        "[weight calculator] degenerate propensity score {score} for subject {subject} \
         (row {index}); inverse-probability weight is undefined"
    )]
    DegenerateWeight {
        /// Subject identifier.
        subject: u64,
        /// Row position in the dataset.
        index: usize,
        /// Offending score.
        score: f64,
    },

    /// Regression design matrix is not of full column rank.
    #[error("[{stage}] singular design: {detail}")]
    SingularDesign {
        /// Component whose design was rank deficient.
        stage: Stage,
        /// What made it singular.
        detail: String,
    },
}

impl Error {
    /// Shorthand for [`Error::Data`].
    pub fn data(stage: Stage, detail: impl Into<String>) -> Self {
        Error::Data { stage, detail: detail.into() }
    }

    /// Shorthand for [`Error::SingularDesign`].
    pub fn singular(stage: Stage, detail: impl Into<String>) -> Self {
        Error::SingularDesign { stage, detail: detail.into() }
    }

    /// Component the error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Data { stage, .. } | Error::SingularDesign { stage, .. } => Some(*stage),
            Error::Convergence { .. } => Some(Stage::PropensityModel),
            Error::DegenerateWeight { .. } => Some(Stage::WeightCalculator),
            Error::Io(_) | Error::Json(_) | Error::Validation(_) => None,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
