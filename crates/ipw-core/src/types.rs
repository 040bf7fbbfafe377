//! Subject records, datasets and the per-subject annotations derived from them.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, Stage};

/// Baseline covariates recorded for every subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Covariate {
    /// Sex (0 = male, 1 = female).
    Sex,
    /// Age in years at baseline.
    Age,
    /// Race (0 = white, 1 = other).
    Race,
    /// Education level (1..=5).
    Education,
    /// Cigarettes per day at baseline.
    SmokeIntensity,
    /// Years of smoking at baseline.
    SmokeYears,
    /// Usual daily activity level (0..=2).
    Active,
    /// Recreational exercise level (0..=2).
    Exercise,
    /// Body weight at baseline, kg.
    BaselineWeight,
}

impl Covariate {
    /// Number of covariates.
    pub const COUNT: usize = 9;

    /// Every covariate, in storage order.
    pub const ALL: [Covariate; Covariate::COUNT] = [
        Covariate::Sex,
        Covariate::Age,
        Covariate::Race,
        Covariate::Education,
        Covariate::SmokeIntensity,
        Covariate::SmokeYears,
        Covariate::Active,
        Covariate::Exercise,
        Covariate::BaselineWeight,
    ];

    /// Column name in the input table.
    pub fn column(self) -> &'static str {
        match self {
            Covariate::Sex => "sex",
            Covariate::Age => "age",
            Covariate::Race => "race",
            Covariate::Education => "education",
            Covariate::SmokeIntensity => "smokeintensity",
            Covariate::SmokeYears => "smokeyrs",
            Covariate::Active => "active",
            Covariate::Exercise => "exercise",
            Covariate::BaselineWeight => "wt71",
        }
    }

    #[inline]
    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Covariate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// One regressor built from a covariate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "covariate", rename_all = "snake_case")]
pub enum Term {
    /// The covariate as-is.
    Linear(Covariate),
    /// The squared covariate.
    Quadratic(Covariate),
    /// One indicator column per observed level except the lowest.
    Categorical(Covariate),
}

impl Term {
    /// Covariate the term is built from.
    pub fn covariate(self) -> Covariate {
        match self {
            Term::Linear(c) | Term::Quadratic(c) | Term::Categorical(c) => c,
        }
    }
}

/// One subject (row) of the analysis table.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectRecord {
    id: u64,
    treated: bool,
    outcome: f64,
    covariates: [Option<f64>; Covariate::COUNT],
}

impl SubjectRecord {
    /// Create a record with every covariate missing.
    pub fn new(id: u64, treated: bool, outcome: f64) -> Self {
        Self { id, treated, outcome, covariates: [None; Covariate::COUNT] }
    }

    /// Builder-style setter for one covariate value.
    pub fn with_covariate(mut self, covariate: Covariate, value: f64) -> Self {
        self.covariates[covariate.slot()] = Some(value);
        self
    }

    /// Subject identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the subject received the treatment.
    pub fn treated(&self) -> bool {
        self.treated
    }

    /// Observed outcome.
    pub fn outcome(&self) -> f64 {
        self.outcome
    }

    /// Covariate value, `None` if missing.
    pub fn covariate(&self, covariate: Covariate) -> Option<f64> {
        self.covariates[covariate.slot()]
    }
}

/// Ordered, immutable collection of subject records.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<SubjectRecord>,
}

impl Dataset {
    /// Build a dataset, rejecting empty input, duplicate ids and non-finite values.
    pub fn new(records: Vec<SubjectRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::data(Stage::Loader, "dataset must contain at least one subject"));
        }
        let mut seen = HashSet::with_capacity(records.len());
        for r in &records {
            if !seen.insert(r.id) {
                return Err(Error::data(Stage::Loader, format!("duplicate subject id {}", r.id)));
            }
            if !r.outcome.is_finite() {
                return Err(Error::data(
                    Stage::Loader,
                    format!("subject {} has non-finite outcome {}", r.id, r.outcome),
                ));
            }
            let non_finite = |c: &&Covariate| r.covariate(**c).is_some_and(|v| !v.is_finite());
            if let Some(c) = Covariate::ALL.iter().find(non_finite) {
                return Err(Error::data(
                    Stage::Loader,
                    format!("subject {} has non-finite `{}`", r.id, c),
                ));
            }
        }
        Ok(Self { records })
    }

    /// Number of subjects.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false for a constructed dataset.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in order.
    pub fn records(&self) -> &[SubjectRecord] {
        &self.records
    }

    /// Subject identifiers in order.
    pub fn ids(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.id).collect()
    }

    /// Treatment indicators in order.
    pub fn treated(&self) -> Vec<bool> {
        self.records.iter().map(|r| r.treated).collect()
    }

    /// Outcomes in order.
    pub fn outcomes(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.outcome).collect()
    }

    /// One covariate column in order.
    pub fn covariate(&self, covariate: Covariate) -> Vec<Option<f64>> {
        self.records.iter().map(|r| r.covariate(covariate)).collect()
    }

    /// Number of treated subjects.
    pub fn n_treated(&self) -> usize {
        self.records.iter().filter(|r| r.treated).count()
    }
}

/// Predicted probability of treatment, one per subject in dataset order.
///
/// Values lie in `[0, 1]`. Scores saturated at 0 or 1 are kept; the weight
/// calculator reports them as positivity violations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropensityScores {
    values: Vec<f64>,
}

impl PropensityScores {
    /// Wrap raw scores, rejecting NaN and values outside `[0, 1]`.
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if let Some((i, v)) = values.iter().enumerate().find(|(_, v)| !(0.0..=1.0).contains(*v)) {
            return Err(Error::Validation(format!(
                "propensity score at row {} must lie in [0, 1], got {}",
                i, v
            )));
        }
        Ok(Self { values })
    }

    /// Scores in dataset order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of scores.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when there are no scores.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of scores exactly at 0 or 1.
    pub fn n_degenerate(&self) -> usize {
        self.values.iter().filter(|&&p| p == 0.0 || p == 1.0).count()
    }
}

/// How raw inverse-probability weights are rescaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stabilization {
    /// `1/p` for treated, `1/(1-p)` for untreated.
    #[default]
    None,
    /// Raw weight times the marginal probability of the observed treatment.
    Marginal,
}

/// Strictly positive per-subject weights in dataset order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Weights {
    values: Vec<f64>,
    stabilization: Stabilization,
}

impl Weights {
    /// Wrap weights, rejecting non-positive or non-finite values.
    pub fn new(values: Vec<f64>, stabilization: Stabilization) -> Result<Self> {
        if let Some((i, w)) = values.iter().enumerate().find(|(_, w)| !(w.is_finite() && **w > 0.0))
        {
            return Err(Error::data(
                Stage::WeightCalculator,
                format!("weight at row {} must be finite and > 0, got {}", i, w),
            ));
        }
        Ok(Self { values, stabilization })
    }

    /// Unit weights (ordinary least squares).
    pub fn uniform(n: usize) -> Self {
        Self { values: vec![1.0; n], stabilization: Stabilization::None }
    }

    /// Weights in dataset order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Stabilization applied.
    pub fn stabilization(&self) -> Stabilization {
        self.stabilization
    }

    /// Number of weights.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when there are no weights.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
