//! End-to-end properties of the IPW pipeline on synthetic cohorts.
//!
//! - effect recovery on a confounded cohort with a correctly specified model
//! - constant propensity reduces IPW to ordinary least squares
//! - weights are recoverable from scores; stabilization keeps within-group order
//! - positivity violations and constant treatment fail with typed errors

use approx::assert_relative_eq;
use ipw_core::{
    Covariate, Dataset, Error, PipelineConfig, PropensityScores, Stabilization, Stage,
    SubjectRecord, Term, Weights,
};
use ipw_inference::{
    PropensityModel, SyntheticConfig, WeightCalculator, WeightedEffectEstimator,
    generate_cessation_cohort, run_pipeline,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Linear-logit terms matching the synthetic generating model.
fn true_model_terms() -> Vec<Term> {
    use Covariate::*;
    vec![
        Term::Linear(Sex),
        Term::Linear(Age),
        Term::Linear(Race),
        Term::Linear(SmokeIntensity),
        Term::Linear(BaselineWeight),
        Term::Linear(Exercise),
    ]
}

fn true_model_config() -> PipelineConfig {
    PipelineConfig { terms: true_model_terms(), ..Default::default() }
}

fn cohort(n: usize, seed: u64) -> Dataset {
    let cfg = SyntheticConfig { n_subjects: n, seed, ..Default::default() };
    generate_cessation_cohort(&cfg).unwrap().dataset
}

// ---------------------------------------------------------------------------
// Effect recovery
// ---------------------------------------------------------------------------

#[test]
fn ipw_recovers_true_effect_on_confounded_cohort() {
    let data = cohort(1000, 42);
    let report = run_pipeline(&data, &true_model_config()).unwrap();

    assert_eq!(report.n_subjects, 1000);
    assert!(
        (report.ipw.effect - 2.0).abs() < 0.3,
        "IPW effect {} too far from 2.0",
        report.ipw.effect
    );
    assert!(report.ipw.ci_lower < report.ipw.effect && report.ipw.effect < report.ipw.ci_upper);
    assert!(report.ipw.std_error > 0.0 && report.ipw.std_error.is_finite());
    assert_eq!(report.crude.n_obs, 1000);
}

#[test]
fn stabilized_pipeline_gives_same_point_estimate() {
    let data = cohort(600, 3);
    let raw = run_pipeline(&data, &true_model_config()).unwrap();
    let stab =
        run_pipeline(&data, &PipelineConfig { stabilize: true, ..true_model_config() }).unwrap();

    // Per-group rescaling leaves each weighted group mean unchanged.
    assert_relative_eq!(raw.ipw.effect, stab.ipw.effect, epsilon = 1e-8);
    assert_eq!(stab.weights.stabilization(), Stabilization::Marginal);
    assert!((stab.weight_summary.mean - 1.0).abs() < 0.25, "mean {}", stab.weight_summary.mean);
}

#[test]
fn default_nhefs_model_converges_on_synthetic_cohort() {
    let data = cohort(1000, 42);
    let report = run_pipeline(&data, &PipelineConfig::default()).unwrap();

    let model = &report.propensity_model;
    assert!(model.iterations() <= 25);
    assert!(model.log_likelihood().is_finite());
    assert!(model.coefficient("age^2").is_some());
    assert!(model.coefficient("education=2").is_some());
    assert!(report.ipw.effect.is_finite());
}

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

#[test]
fn constant_propensity_reduces_ipw_to_ols() {
    let data = cohort(300, 11);
    let treated = data.treated();
    let outcome = data.outcomes();

    let scores = PropensityScores::new(vec![0.5; data.len()]).unwrap();
    let weights = WeightCalculator::new(Stabilization::None)
        .compute(&data.ids(), &treated, &scores)
        .unwrap();
    assert!(weights.values().iter().all(|&w| (w - 2.0).abs() < 1e-12));

    let ipw = WeightedEffectEstimator::new().estimate(&outcome, &treated, &weights).unwrap();
    let ols = WeightedEffectEstimator::new()
        .estimate(&outcome, &treated, &Weights::uniform(data.len()))
        .unwrap();
    assert_relative_eq!(ipw.effect, ols.effect, epsilon = 1e-10);
    assert_relative_eq!(ipw.coefficients[0], ols.coefficients[0], epsilon = 1e-10);
}

#[test]
fn pipeline_weights_reconstruct_from_scores() {
    let data = cohort(400, 5);
    let report = run_pipeline(&data, &true_model_config()).unwrap();

    let scores = report.scores.values();
    assert!(scores.iter().all(|&p| p > 0.0 && p < 1.0));
    for (i, rec) in data.records().iter().enumerate() {
        let w = report.weights.values()[i];
        let p = if rec.treated() { 1.0 / w } else { 1.0 - 1.0 / w };
        assert!((p - scores[i]).abs() < 1e-9, "row {}: {} vs {}", i, p, scores[i]);
    }
}

#[test]
fn stabilization_keeps_sign_and_within_group_order() {
    let data = cohort(200, 9);
    let treated = data.treated();
    let (_, scores) = PropensityModel::new(true_model_terms()).fit(&data).unwrap();

    let raw =
        WeightCalculator::new(Stabilization::None).compute(&data.ids(), &treated, &scores).unwrap();
    let stab = WeightCalculator::new(Stabilization::Marginal)
        .compute(&data.ids(), &treated, &scores)
        .unwrap();

    assert!(stab.values().iter().all(|&w| w > 0.0));
    for group in [true, false] {
        let mut idx: Vec<usize> = (0..data.len()).filter(|&i| treated[i] == group).collect();
        idx.sort_by(|&a, &b| raw.values()[a].total_cmp(&raw.values()[b]));
        for pair in idx.windows(2) {
            assert!(stab.values()[pair[0]] <= stab.values()[pair[1]]);
        }
    }
}

// ---------------------------------------------------------------------------
// Failure modes
// ---------------------------------------------------------------------------

#[test]
fn extreme_subject_yields_degenerate_weight() {
    let data = cohort(500, 21);
    let (model, _) = PropensityModel::new(vec![Term::Linear(Covariate::Age)]).fit(&data).unwrap();
    assert!(model.coefficient("age").unwrap().abs() > 1e-3);

    let extremes = Dataset::new(vec![
        SubjectRecord::new(1, true, 0.0).with_covariate(Covariate::Age, 50.0),
        SubjectRecord::new(77, false, 0.0).with_covariate(Covariate::Age, 1.0e5),
        SubjectRecord::new(78, true, 0.0).with_covariate(Covariate::Age, -1.0e5),
    ])
    .unwrap();
    let scores = model.predict(&extremes).unwrap();
    assert_eq!(scores.n_degenerate(), 2);

    let err = WeightCalculator::new(Stabilization::None)
        .compute(&extremes.ids(), &extremes.treated(), &scores)
        .unwrap_err();
    match err {
        Error::DegenerateWeight { subject, index, score } => {
            assert_eq!(subject, 77);
            assert_eq!(index, 1);
            assert!(score == 0.0 || score == 1.0);
        }
        other => panic!("expected degenerate weight, got {other}"),
    }
}

#[test]
fn all_treated_cohort_is_singular_in_effect_estimator() {
    let records = (0..20)
        .map(|i| {
            SubjectRecord::new(i, true, i as f64)
                .with_covariate(Covariate::Age, 30.0 + i as f64)
                .with_covariate(Covariate::Sex, (i % 2) as f64)
        })
        .collect();
    let data = Dataset::new(records).unwrap();
    let cfg = PipelineConfig {
        terms: vec![Term::Linear(Covariate::Age), Term::Linear(Covariate::Sex)],
        ..Default::default()
    };

    let err = run_pipeline(&data, &cfg).unwrap_err();
    assert!(
        matches!(err, Error::SingularDesign { stage: Stage::EffectEstimator, .. }),
        "got {err}"
    );
}

#[test]
fn iteration_budget_of_one_reports_non_convergence() {
    let data = cohort(300, 13);
    let cfg = PipelineConfig { max_iterations: 1, ..true_model_config() };

    match run_pipeline(&data, &cfg).unwrap_err() {
        Error::Convergence { iterations, coefficients, .. } => {
            assert_eq!(iterations, 1);
            assert_eq!(coefficients.len(), true_model_terms().len() + 1);
        }
        other => panic!("expected convergence error, got {other}"),
    }
}

#[test]
fn missing_covariate_is_a_propensity_data_error() {
    let mut records: Vec<SubjectRecord> = (0..10)
        .map(|i| {
            SubjectRecord::new(i, i % 2 == 0, i as f64)
                .with_covariate(Covariate::Age, 40.0 + i as f64)
        })
        .collect();
    records.push(SubjectRecord::new(99, true, 3.0));
    let data = Dataset::new(records).unwrap();
    let cfg = PipelineConfig { terms: vec![Term::Linear(Covariate::Age)], ..Default::default() };

    let err = run_pipeline(&data, &cfg).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::PropensityModel));
    assert!(err.to_string().contains("99"), "{err}");
}
