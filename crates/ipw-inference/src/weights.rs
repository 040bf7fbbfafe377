//! Inverse-probability weights from propensity scores.

use ipw_core::{Error, PipelineConfig, PropensityScores, Result, Stabilization, Stage, Weights};

use crate::propensity::marginal_treatment_probability;

/// Raw inverse-probability weight: `1/p` if treated, `1/(1-p)` otherwise.
///
/// Returns `inf` at the boundary; [`WeightCalculator::compute`] turns that
/// into [`Error::DegenerateWeight`].
#[inline]
pub fn raw_weight(treated: bool, score: f64) -> f64 {
    if treated { 1.0 / score } else { 1.0 / (1.0 - score) }
}

/// Turns propensity scores into per-subject weights.
#[derive(Debug, Clone)]
pub struct WeightCalculator {
    stabilization: Stabilization,
    tolerance: f64,
    max_iterations: usize,
}

impl WeightCalculator {
    /// Calculator with the given stabilization; the treatment-only model used
    /// for stabilization is fit with tolerance `1e-8` and 25 iterations.
    pub fn new(stabilization: Stabilization) -> Self {
        Self { stabilization, tolerance: 1e-8, max_iterations: 25 }
    }

    /// Calculator as described by a pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let stabilization =
            if config.stabilize { Stabilization::Marginal } else { Stabilization::None };
        Self {
            stabilization,
            tolerance: config.convergence_tolerance,
            max_iterations: config.max_iterations,
        }
    }

    /// Compute weights for subjects `ids` with treatment `treated` and `scores`,
    /// all in the same order.
    ///
    /// A score of exactly 0 or 1 is a positivity violation and fails with
    /// [`Error::DegenerateWeight`]; nothing is clipped.
    pub fn compute(
        &self,
        ids: &[u64],
        treated: &[bool],
        scores: &PropensityScores,
    ) -> Result<Weights> {
        let n = scores.len();
        if treated.len() != n || ids.len() != n {
            return Err(Error::data(
                Stage::WeightCalculator,
                format!(
                    "length mismatch: {} scores, {} treatment values, {} ids",
                    n,
                    treated.len(),
                    ids.len()
                ),
            ));
        }

        let mut values = Vec::with_capacity(n);
        for (i, (&t, &p)) in treated.iter().zip(scores.values()).enumerate() {
            let w = raw_weight(t, p);
            if p <= 0.0 || p >= 1.0 || !w.is_finite() {
                return Err(Error::DegenerateWeight { subject: ids[i], index: i, score: p });
            }
            values.push(w);
        }

        if self.stabilization == Stabilization::Marginal {
            let p_treated =
                marginal_treatment_probability(treated, self.tolerance, self.max_iterations)?;
            for (w, &t) in values.iter_mut().zip(treated) {
                *w *= if t { p_treated } else { 1.0 - p_treated };
            }
            tracing::debug!(p_treated, "stabilized weights with marginal treatment probability");
        }

        Weights::new(values, self.stabilization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ids(n: usize) -> Vec<u64> {
        (0..n as u64).collect()
    }

    const TREATED: [bool; 6] = [true, false, true, false, false, true];
    const SCORES: [f64; 6] = [0.2, 0.7, 0.55, 0.1, 0.35, 0.9];

    fn compute(stabilization: Stabilization, scores: &PropensityScores) -> Result<Weights> {
        WeightCalculator::new(stabilization).compute(&ids(6), &TREATED, scores)
    }

    #[test]
    fn test_weights_reconstruct_from_scores() {
        let scores = PropensityScores::new(SCORES.to_vec()).unwrap();
        let w = compute(Stabilization::None, &scores).unwrap();
        for i in 0..6 {
            let expected = if TREATED[i] { 1.0 / SCORES[i] } else { 1.0 / (1.0 - SCORES[i]) };
            assert_relative_eq!(w.values()[i], expected, epsilon = 1e-9);
            assert!(w.values()[i] > 0.0);
        }
        assert_eq!(w.stabilization(), Stabilization::None);
    }

    #[test]
    fn test_stabilized_weights_rescale_by_marginal_probability() {
        let scores = PropensityScores::new(SCORES.to_vec()).unwrap();
        let raw = compute(Stabilization::None, &scores).unwrap();
        let stab = compute(Stabilization::Marginal, &scores).unwrap();

        // Half the subjects are treated.
        for i in 0..6 {
            assert_relative_eq!(stab.values()[i], raw.values()[i] * 0.5, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_stabilization_preserves_sign_and_group_order() {
        let scores = PropensityScores::new(SCORES.to_vec()).unwrap();
        let raw = compute(Stabilization::None, &scores).unwrap();
        let stab = compute(Stabilization::Marginal, &scores).unwrap();

        assert!(stab.values().iter().all(|&w| w > 0.0));
        for group in [true, false] {
            let idx: Vec<usize> = (0..6).filter(|&i| TREATED[i] == group).collect();
            for &a in &idx {
                for &b in &idx {
                    let raw_order = raw.values()[a].total_cmp(&raw.values()[b]);
                    let stab_order = stab.values()[a].total_cmp(&stab.values()[b]);
                    assert_eq!(raw_order, stab_order);
                }
            }
        }
    }

    #[test]
    fn test_degenerate_score_is_reported_not_clipped() {
        let scores = PropensityScores::new(vec![0.4, 1.0, 0.3]).unwrap();
        let err = WeightCalculator::new(Stabilization::None)
            .compute(&[10, 11, 12], &[false, true, false], &scores)
            .unwrap_err();
        match err {
            Error::DegenerateWeight { subject, index, score } => {
                assert_eq!(subject, 11);
                assert_eq!(index, 1);
                assert_eq!(score, 1.0);
            }
            other => panic!("expected degenerate weight, got {other}"),
        }

        // Score 0 for an untreated subject is still a positivity violation.
        let scores = PropensityScores::new(vec![0.0]).unwrap();
        assert!(matches!(
            WeightCalculator::new(Stabilization::None).compute(&[1], &[false], &scores),
            Err(Error::DegenerateWeight { .. })
        ));
    }

    #[test]
    fn test_stabilizing_constant_treatment_is_weight_error() {
        let scores = PropensityScores::new(vec![0.5; 4]).unwrap();
        for treatment in [true, false] {
            let err = WeightCalculator::new(Stabilization::Marginal)
                .compute(&ids(4), &[treatment; 4], &scores)
                .unwrap_err();
            assert!(matches!(err, Error::Data { stage: Stage::WeightCalculator, .. }), "{err}");
            assert_eq!(err.stage(), Some(Stage::WeightCalculator));
        }

        // Unstabilized weights need no marginal model.
        let w = WeightCalculator::new(Stabilization::None)
            .compute(&ids(4), &[true; 4], &scores)
            .unwrap();
        assert!(w.values().iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_length_mismatch_is_data_error() {
        let scores = PropensityScores::new(vec![0.5, 0.5]).unwrap();
        let err = WeightCalculator::new(Stabilization::None)
            .compute(&[1, 2], &[true], &scores)
            .unwrap_err();
        assert!(matches!(err, Error::Data { stage: Stage::WeightCalculator, .. }));
    }
}
