//! Fitness model.
//!
//! Collapses per-dimension scores into a single aggregate and compares
//! candidates by Pareto dominance over their per-example aggregates.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainResult, OptimizerError};
use crate::domain::models::{DimensionScores, DimensionWeights};

/// Outcome of comparing two per-example aggregate vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dominance {
    Dominates,
    DominatedBy,
    Incomparable,
    Equal,
}

/// Weighted dot product of `scores` and `weights`.
///
/// Both mappings must cover exactly the same dimensions.
pub fn weighted_score(scores: &DimensionScores, weights: &DimensionWeights) -> DomainResult<f64> {
    if !scores.same_keys(weights.as_map()) {
        return Err(OptimizerError::DimensionMismatch {
            expected: weights.dimensions(),
            actual: scores.dimensions(),
        });
    }
    Ok(weights.dot(scores))
}

/// Pareto comparison of two equal-length aggregate vectors.
///
/// `a` dominates `b` iff it is at least as good on every example and
/// strictly better on one. Exact ties are never domination. Vectors of
/// different length are incomparable.
pub fn compare(a: &[f64], b: &[f64]) -> Dominance {
    if a.len() != b.len() {
        return Dominance::Incomparable;
    }
    let mut a_better = false;
    let mut b_better = false;
    for (x, y) in a.iter().zip(b) {
        if x > y {
            a_better = true;
        } else if y > x {
            b_better = true;
        }
        if a_better && b_better {
            return Dominance::Incomparable;
        }
    }
    match (a_better, b_better) {
        (true, false) => Dominance::Dominates,
        (false, true) => Dominance::DominatedBy,
        (false, false) => Dominance::Equal,
        (true, true) => Dominance::Incomparable,
    }
}

pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    compare(a, b) == Dominance::Dominates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Dimension;

    #[test]
    fn test_weighted_score_is_dot_product() {
        let weights = DimensionWeights::from_named([("successRate", 0.75), ("quality", 0.25)]).unwrap();
        let scores = DimensionScores::new()
            .with(Dimension::SuccessRate, 0.8)
            .with(Dimension::Quality, 0.4);
        let score = weighted_score(&scores, &weights).unwrap();
        assert!((score - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_score_rejects_mismatched_keys() {
        let weights = DimensionWeights::from_named([("successRate", 1.0)]).unwrap();
        let scores = DimensionScores::new()
            .with(Dimension::SuccessRate, 0.8)
            .with(Dimension::Quality, 0.4);
        assert!(matches!(
            weighted_score(&scores, &weights),
            Err(OptimizerError::DimensionMismatch { .. })
        ));

        let missing = DimensionScores::new().with(Dimension::Quality, 0.4);
        assert!(weighted_score(&missing, &weights).is_err());
    }

    #[test]
    fn test_compare_cases() {
        assert_eq!(compare(&[0.8, 0.6, 0.7], &[0.5, 0.5, 0.5]), Dominance::Dominates);
        assert_eq!(compare(&[0.5, 0.5, 0.5], &[0.8, 0.6, 0.7]), Dominance::DominatedBy);
        assert_eq!(compare(&[0.9, 0.1], &[0.1, 0.9]), Dominance::Incomparable);
        assert_eq!(compare(&[0.5, 0.5], &[0.5, 0.5]), Dominance::Equal);
        assert_eq!(compare(&[0.5, 0.6], &[0.5, 0.5]), Dominance::Dominates);
    }
}
