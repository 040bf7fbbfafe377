//! # ipw-inference
//!
//! Causal effect estimation by inverse-probability weighting.
//!
//! This crate provides:
//! - a logistic propensity model fitted by IRLS ([`PropensityModel`])
//! - inverse-probability weights, raw or stabilized ([`WeightCalculator`])
//! - weighted least squares with sandwich standard errors ([`WeightedEffectEstimator`])
//! - balance and weight diagnostics
//! - the end-to-end [`run_pipeline`] and a synthetic cohort generator
//!
//! Derived per-subject values (scores, weights) are returned as values and
//! passed explicitly to the next stage; the input [`ipw_core::Dataset`] is
//! never modified.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Design matrices from covariate terms.
pub mod design;
/// Weight, overlap and balance summaries.
pub mod diagnostics;
/// Weighted least squares effect estimator.
pub mod effect;
/// End-to-end analysis.
pub mod pipeline;
/// Logistic propensity model.
pub mod propensity;
/// Synthetic cohorts for tests and demos.
pub mod synthetic;
/// Inverse-probability weights.
pub mod weights;

pub use diagnostics::{
    CovariateBalance, PropensitySummary, ScoreRange, WeightSummary, covariate_balance,
};
pub use effect::{EffectEstimate, TREATMENT_TERM, WeightedEffectEstimator};
pub use pipeline::{PipelineReport, run_pipeline};
pub use propensity::{FittedModel, PropensityModel, marginal_treatment_probability};
pub use synthetic::{SyntheticCohort, SyntheticConfig, generate_cessation_cohort};
pub use weights::{WeightCalculator, raw_weight};
