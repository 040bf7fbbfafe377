//! Presentation-side diagnostics: weight distribution, propensity overlap
//! and covariate balance before and after weighting.

use std::fmt;

use ipw_core::{Covariate, Dataset, PropensityScores, Weights};
use serde::Serialize;

/// Distribution summary of the weights.
#[derive(Debug, Clone, Serialize)]
pub struct WeightSummary {
    /// Number of weights.
    pub n: usize,
    /// Smallest weight.
    pub min: f64,
    /// Largest weight.
    pub max: f64,
    /// Mean weight. Close to 2 for unstabilized and 1 for stabilized IPW.
    pub mean: f64,
    /// Sample standard deviation.
    pub sd: f64,
    /// Sum of weights (size of the pseudo-population).
    pub sum: f64,
}

impl WeightSummary {
    /// Summarise `weights`.
    pub fn from_weights(weights: &Weights) -> Self {
        let w = weights.values();
        let n = w.len();
        let sum: f64 = w.iter().sum();
        let mean = if n > 0 { sum / n as f64 } else { f64::NAN };
        let sd = if n > 1 {
            (w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        Self {
            n,
            min: w.iter().copied().fold(f64::INFINITY, f64::min),
            max: w.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean,
            sd,
            sum,
        }
    }
}

impl fmt::Display for WeightSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Weights: n = {}, min = {:.4}, max = {:.4}, mean = {:.4}, sd = {:.4}, sum = {:.2}",
            self.n, self.min, self.max, self.mean, self.sd, self.sum
        )
    }
}

/// Propensity scores within one treatment group.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRange {
    /// Subjects in the group.
    pub n: usize,
    /// Smallest score.
    pub min: f64,
    /// Mean score.
    pub mean: f64,
    /// Largest score.
    pub max: f64,
}

impl ScoreRange {
    fn from_values(values: impl Iterator<Item = f64>) -> Self {
        let (mut n, mut sum, mut min, mut max) = (0usize, 0.0, f64::INFINITY, f64::NEG_INFINITY);
        for v in values {
            n += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        Self { n, min, mean: if n > 0 { sum / n as f64 } else { f64::NAN }, max }
    }
}

/// Propensity score overlap between treated and untreated subjects.
#[derive(Debug, Clone, Serialize)]
pub struct PropensitySummary {
    /// Scores of treated subjects.
    pub treated: ScoreRange,
    /// Scores of untreated subjects.
    pub control: ScoreRange,
}

impl PropensitySummary {
    /// Split `scores` by `treated`.
    pub fn new(treated: &[bool], scores: &PropensityScores) -> Self {
        let pairs = || treated.iter().zip(scores.values());
        Self {
            treated: ScoreRange::from_values(pairs().filter(|(t, _)| **t).map(|(_, p)| *p)),
            control: ScoreRange::from_values(pairs().filter(|(t, _)| !**t).map(|(_, p)| *p)),
        }
    }
}

impl fmt::Display for PropensitySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<10} {:>7} {:>9} {:>9} {:>9}", "group", "n", "min", "mean", "max")?;
        for (label, r) in [("treated", &self.treated), ("control", &self.control)] {
            writeln!(f, "{:<10} {:>7} {:>9.4} {:>9.4} {:>9.4}", label, r.n, r.min, r.mean, r.max)?;
        }
        Ok(())
    }
}

/// Covariate balance row.
#[derive(Debug, Clone, Serialize)]
pub struct CovariateBalance {
    /// Covariate.
    pub covariate: Covariate,
    /// Unweighted mean among treated.
    pub mean_treated: f64,
    /// Unweighted mean among untreated.
    pub mean_control: f64,
    /// Standardized mean difference before weighting.
    pub smd_raw: f64,
    /// Standardized mean difference in the weighted pseudo-population.
    pub smd_weighted: f64,
}

#[derive(Default)]
struct GroupMoments {
    sw: f64,
    swx: f64,
    swxx: f64,
}

impl GroupMoments {
    fn push(&mut self, w: f64, x: f64) {
        self.sw += w;
        self.swx += w * x;
        self.swxx += w * x * x;
    }

    fn mean(&self) -> f64 {
        self.swx / self.sw
    }

    fn var(&self) -> f64 {
        (self.swxx / self.sw - self.mean().powi(2)).max(0.0)
    }
}

fn smd(t: &GroupMoments, c: &GroupMoments) -> f64 {
    let pooled = ((t.var() + c.var()) / 2.0).sqrt();
    if pooled > 1e-15 { (t.mean() - c.mean()) / pooled } else { 0.0 }
}

/// Standardized mean differences of `covariates` between treatment groups,
/// unweighted and weighted. Subjects missing a covariate are skipped for
/// that covariate only.
pub fn covariate_balance(
    data: &Dataset,
    weights: &Weights,
    covariates: &[Covariate],
) -> Vec<CovariateBalance> {
    let w = weights.values();
    let treated = data.treated();
    covariates
        .iter()
        .filter_map(|&c| {
            let (mut rt, mut rc) = (GroupMoments::default(), GroupMoments::default());
            let (mut wt, mut wc) = (GroupMoments::default(), GroupMoments::default());
            for ((x, &t), &wi) in data.covariate(c).into_iter().zip(&treated).zip(w) {
                let Some(x) = x else { continue };
                if t {
                    rt.push(1.0, x);
                    wt.push(wi, x);
                } else {
                    rc.push(1.0, x);
                    wc.push(wi, x);
                }
            }
            if rt.sw == 0.0 || rc.sw == 0.0 {
                return None;
            }
            Some(CovariateBalance {
                covariate: c,
                mean_treated: rt.mean(),
                mean_control: rc.mean(),
                smd_raw: smd(&rt, &rc),
                smd_weighted: smd(&wt, &wc),
            })
        })
        .collect()
}
