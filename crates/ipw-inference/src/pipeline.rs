//! End-to-end IPW analysis: propensity model → weights → weighted effect,
//! plus the crude (unweighted) estimate and balance diagnostics.

use ipw_core::{Covariate, Dataset, PipelineConfig, PropensityScores, Result, Weights};
use serde::Serialize;

use crate::diagnostics::{
    CovariateBalance, PropensitySummary, WeightSummary, covariate_balance,
};
use crate::effect::{EffectEstimate, WeightedEffectEstimator};
use crate::propensity::{FittedModel, PropensityModel};
use crate::weights::WeightCalculator;

/// Everything one pipeline run produces.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Subjects analysed.
    pub n_subjects: usize,
    /// Treated subjects.
    pub n_treated: usize,
    /// Propensity model fit.
    pub propensity_model: FittedModel,
    /// Score ranges by treatment group.
    pub propensity_summary: PropensitySummary,
    /// Weight distribution.
    pub weight_summary: WeightSummary,
    /// Covariate balance before and after weighting.
    pub balance: Vec<CovariateBalance>,
    /// Unweighted regression of outcome on treatment.
    pub crude: EffectEstimate,
    /// Inverse-probability-weighted estimate.
    pub ipw: EffectEstimate,
    /// Per-subject scores (not serialized).
    #[serde(skip)]
    pub scores: PropensityScores,
    /// Per-subject weights (not serialized).
    #[serde(skip)]
    pub weights: Weights,
}

/// Run the full analysis on `data`.
///
/// Every failure is fatal and attributed to the stage that raised it.
pub fn run_pipeline(data: &Dataset, config: &PipelineConfig) -> Result<PipelineReport> {
    config.validate()?;
    let treated = data.treated();
    tracing::info!(n = data.len(), n_treated = data.n_treated(), "starting IPW pipeline");

    let estimator = WeightedEffectEstimator::from_config(config);
    let crude = WeightedEffectEstimator::from_config(config)
        .with_adjustment(Vec::new())
        .estimate(&data.outcomes(), &treated, &Weights::uniform(data.len()))?;
    tracing::info!(effect = crude.effect, "crude estimate");

    let (propensity_model, scores) = PropensityModel::from_config(config).fit(data)?;
    let propensity_summary = PropensitySummary::new(&treated, &scores);

    let weights = WeightCalculator::from_config(config).compute(&data.ids(), &treated, &scores)?;
    let weight_summary = WeightSummary::from_weights(&weights);
    tracing::info!(
        min = weight_summary.min,
        max = weight_summary.max,
        mean = weight_summary.mean,
        stabilization = ?weights.stabilization(),
        "weights computed"
    );

    let balance = covariate_balance(data, &weights, &Covariate::ALL);
    let ipw = estimator.estimate_dataset(data, &weights)?;

    Ok(PipelineReport {
        n_subjects: data.len(),
        n_treated: data.n_treated(),
        propensity_model,
        propensity_summary,
        weight_summary,
        balance,
        crude,
        ipw,
        scores,
        weights,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{SyntheticConfig, generate_cessation_cohort};
    use ipw_core::{Stage, SubjectRecord, Term};

    #[test]
    fn test_report_serializes_without_per_subject_vectors() {
        let cohort =
            generate_cessation_cohort(&SyntheticConfig { n_subjects: 300, ..Default::default() })
                .unwrap();
        let cfg = PipelineConfig {
            terms: vec![Term::Linear(Covariate::Age), Term::Linear(Covariate::Sex)],
            ..Default::default()
        };
        let report = run_pipeline(&cohort.dataset, &cfg).unwrap();
        assert_eq!(report.scores.len(), 300);
        assert_eq!(report.weights.len(), 300);
        assert_eq!(report.balance.len(), Covariate::COUNT);

        let v = serde_json::to_value(&report).unwrap();
        assert!(v.get("scores").is_none());
        assert!(v.get("weights").is_none());
        assert_eq!(v["propensity_model"]["names"][1], "age");
        assert_eq!(v["ipw"]["names"][1], "treatment");
    }

    #[test]
    fn test_invalid_config_fails_before_any_stage() {
        let data = Dataset::new(vec![SubjectRecord::new(1, true, 0.0)]).unwrap();
        let cfg = PipelineConfig { confidence_level: 1.5, ..Default::default() };
        let err = run_pipeline(&data, &cfg).unwrap_err();
        assert!(matches!(err, ipw_core::Error::Validation(_)));
        assert_eq!(err.stage(), None::<Stage>);
    }
}
