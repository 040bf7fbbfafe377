//! Synthetic smoking-cessation cohorts with a known propensity model and a
//! known additive treatment effect.
//!
//! The data-generating process is:
//!
//! ```text
//! logit P(A=1 | L) = α₀ + 0.04·(age−45) + 0.35·sex − 0.30·race
//!                    − 0.015·(smokeintensity−20) + 0.01·(wt71−72) + 0.15·exercise
//! Y = 3 + effect·A − 0.05·(age−45) + 0.4·sex + 0.02·(smokeintensity−20)
//!       − 0.02·(wt71−72) + ε,   ε ~ N(0, noise_sd²)
//! ```
//!
//! Treatment assignment depends only on covariates that also enter the
//! outcome, so the crude difference in means is confounded while IPW with a
//! correctly specified (linear-logit) propensity model is consistent.

use ipw_core::{Covariate, Dataset, Error, Result, SubjectRecord};
use ipw_prob::math::sigmoid;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Parameters of the synthetic cohort.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Number of subjects.
    pub n_subjects: usize,
    /// True additive effect of treatment on the outcome.
    pub treatment_effect: f64,
    /// Intercept of the true propensity model.
    pub propensity_intercept: f64,
    /// Standard deviation of the outcome noise.
    pub noise_sd: f64,
    /// Random seed for reproducibility.
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            n_subjects: 1000,
            treatment_effect: 2.0,
            propensity_intercept: -0.6,
            noise_sd: 0.8,
            seed: 42,
        }
    }
}

/// Generated cohort together with its true propensity scores.
#[derive(Debug, Clone)]
pub struct SyntheticCohort {
    /// Subjects.
    pub dataset: Dataset,
    /// `P(A=1 | L)` under the generating model, dataset order.
    pub true_propensity: Vec<f64>,
}

/// Generate a synthetic cohort. Fully deterministic given `config.seed`.
pub fn generate_cessation_cohort(config: &SyntheticConfig) -> Result<SyntheticCohort> {
    if config.n_subjects == 0 {
        return Err(Error::Validation("n_subjects must be > 0".into()));
    }
    if !(config.noise_sd.is_finite() && config.noise_sd >= 0.0) {
        return Err(Error::Validation("noise_sd must be finite and >= 0".into()));
    }
    if !config.treatment_effect.is_finite() || !config.propensity_intercept.is_finite() {
        return Err(Error::Validation(
            "treatment_effect and propensity_intercept must be finite".into(),
        ));
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(config.seed);
    let weight_dist = Normal::<f64>::new(72.0, 14.0)
        .map_err(|e| Error::Validation(format!("weight distribution: {e}")))?;
    let noise = Normal::new(0.0, config.noise_sd)
        .map_err(|e| Error::Validation(format!("noise distribution: {e}")))?;

    let mut records = Vec::with_capacity(config.n_subjects);
    let mut true_propensity = Vec::with_capacity(config.n_subjects);

    for i in 0..config.n_subjects {
        let sex = f64::from(u8::from(rng.random_bool(0.5)));
        let race = f64::from(u8::from(rng.random_bool(0.15)));
        let age = rng.random_range(25..=74) as f64;
        let education = rng.random_range(1..=5) as f64;
        let smokeintensity = rng.random_range(1..=60) as f64;
        let smokeyrs = (age - 15.0 - rng.random_range(0..=10) as f64).max(1.0);
        let active = rng.random_range(0..=2) as f64;
        let exercise = rng.random_range(0..=2) as f64;
        let wt71 = weight_dist.sample(&mut rng).clamp(40.0, 140.0);

        let eta = config.propensity_intercept + 0.04 * (age - 45.0) + 0.35 * sex - 0.30 * race
            - 0.015 * (smokeintensity - 20.0)
            + 0.01 * (wt71 - 72.0)
            + 0.15 * exercise;
        let p = sigmoid(eta);
        let treated = rng.random_bool(p);

        let outcome = 3.0
            + if treated { config.treatment_effect } else { 0.0 }
            - 0.05 * (age - 45.0)
            + 0.4 * sex
            + 0.02 * (smokeintensity - 20.0)
            - 0.02 * (wt71 - 72.0)
            + noise.sample(&mut rng);

        records.push(
            SubjectRecord::new(i as u64 + 1, treated, outcome)
                .with_covariate(Covariate::Sex, sex)
                .with_covariate(Covariate::Age, age)
                .with_covariate(Covariate::Race, race)
                .with_covariate(Covariate::Education, education)
                .with_covariate(Covariate::SmokeIntensity, smokeintensity)
                .with_covariate(Covariate::SmokeYears, smokeyrs)
                .with_covariate(Covariate::Active, active)
                .with_covariate(Covariate::Exercise, exercise)
                .with_covariate(Covariate::BaselineWeight, wt71),
        );
        true_propensity.push(p);
    }

    Ok(SyntheticCohort { dataset: Dataset::new(records)?, true_propensity })
}
