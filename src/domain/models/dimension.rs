//! Fitness dimensions, per-dimension scores, and dimension weights.
//!
//! The dimension set is closed: anything outside [`Dimension::ALL`] is
//! rejected at the boundary with [`OptimizerError::UnknownDimension`].
//! Weights are always non-negative and sum to 1.0 once constructed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::{DomainResult, OptimizerError};

/// Tolerance accepted when validating externally supplied weights.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// One axis of candidate quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    /// Did the output solve the task
    SuccessRate,
    /// Accuracy and relevance of the output
    Quality,
    /// Speed and conciseness
    Efficiency,
    /// Consistency across different inputs
    Robustness,
    /// Performance on unseen examples
    Generalization,
    /// Distinctness from other archived candidates
    Diversity,
    /// Novel approaches
    Innovation,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Self::SuccessRate,
        Self::Quality,
        Self::Efficiency,
        Self::Robustness,
        Self::Generalization,
        Self::Diversity,
        Self::Innovation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuccessRate => "successRate",
            Self::Quality => "quality",
            Self::Efficiency => "efficiency",
            Self::Robustness => "robustness",
            Self::Generalization => "generalization",
            Self::Diversity => "diversity",
            Self::Innovation => "innovation",
        }
    }

    /// Weight this dimension carries in [`DimensionWeights::defaults`].
    pub fn default_weight(&self) -> f64 {
        match self {
            Self::SuccessRate => 0.25,
            Self::Quality => 0.20,
            Self::Efficiency => 0.15,
            Self::Robustness => 0.15,
            Self::Generalization => 0.10,
            Self::Diversity => 0.10,
            Self::Innovation => 0.05,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| OptimizerError::UnknownDimension(s.to_string()))
    }
}

// ============================================================================
// Scores
// ============================================================================

/// Per-dimension scores for a single (candidate, example) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionScores(BTreeMap<Dimension, f64>);

impl DimensionScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scores of 0.0 on every listed dimension.
    pub fn zeroed<'a>(dimensions: impl IntoIterator<Item = &'a Dimension>) -> Self {
        Self(dimensions.into_iter().map(|d| (*d, 0.0)).collect())
    }

    pub fn with(mut self, dimension: Dimension, score: f64) -> Self {
        self.0.insert(dimension, score);
        self
    }

    pub fn insert(&mut self, dimension: Dimension, score: f64) {
        self.0.insert(dimension, score);
    }

    pub fn get(&self, dimension: Dimension) -> Option<f64> {
        self.0.get(&dimension).copied()
    }

    pub fn dimensions(&self) -> Vec<Dimension> {
        self.0.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        self.0.iter().map(|(d, s)| (*d, *s))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether both mappings cover exactly the same dimensions.
    pub fn same_keys<V>(&self, other: &BTreeMap<Dimension, V>) -> bool {
        self.0.len() == other.len() && self.0.keys().zip(other.keys()).all(|(a, b)| a == b)
    }

    /// Per-dimension arithmetic mean over a set of score maps.
    pub fn mean<'a>(all: impl IntoIterator<Item = &'a DimensionScores>) -> Self {
        let mut sums: BTreeMap<Dimension, (f64, usize)> = BTreeMap::new();
        for scores in all {
            for (d, s) in scores.iter() {
                let slot = sums.entry(d).or_insert((0.0, 0));
                slot.0 += s;
                slot.1 += 1;
            }
        }
        Self(
            sums.into_iter()
                .map(|(d, (sum, n))| (d, sum / n as f64))
                .collect(),
        )
    }
}

impl FromIterator<(Dimension, f64)> for DimensionScores {
    fn from_iter<T: IntoIterator<Item = (Dimension, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// Weights
// ============================================================================

/// Non-negative weights over a fixed set of dimensions, summing to 1.0.
///
/// The key set of a weight vector is the active dimension set of the run
/// that owns it; it never changes once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<Dimension, f64>", into = "BTreeMap<Dimension, f64>")]
pub struct DimensionWeights(BTreeMap<Dimension, f64>);

impl DimensionWeights {
    /// Validate and wrap a caller-supplied weight map.
    pub fn new(weights: BTreeMap<Dimension, f64>) -> DomainResult<Self> {
        if weights.is_empty() {
            return Err(OptimizerError::RunSetupInvalid(
                "weights must name at least one dimension".to_string(),
            ));
        }
        if let Some((d, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(OptimizerError::RunSetupInvalid(format!(
                "weight for {d} must be finite and non-negative, got {w}"
            )));
        }
        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(OptimizerError::RunSetupInvalid(format!(
                "weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(Self(weights))
    }

    /// Parse a weight map keyed by dimension names.
    pub fn from_named<'a>(pairs: impl IntoIterator<Item = (&'a str, f64)>) -> DomainResult<Self> {
        let mut map = BTreeMap::new();
        for (name, w) in pairs {
            map.insert(name.parse::<Dimension>()?, w);
        }
        Self::new(map)
    }

    /// The default seven-dimension weighting.
    pub fn defaults() -> Self {
        Self(Dimension::ALL.iter().map(|d| (*d, d.default_weight())).collect())
    }

    /// Equal weight on every listed dimension.
    pub fn uniform(dimensions: &[Dimension]) -> DomainResult<Self> {
        let mut unique: Vec<Dimension> = dimensions.to_vec();
        unique.sort();
        unique.dedup();
        if unique.is_empty() {
            return Err(OptimizerError::RunSetupInvalid(
                "weights must name at least one dimension".to_string(),
            ));
        }
        let w = 1.0 / unique.len() as f64;
        Ok(Self(unique.into_iter().map(|d| (d, w)).collect()))
    }

    /// Default weights projected onto `dimensions` and renormalized.
    pub fn restricted_to(dimensions: &[Dimension]) -> DomainResult<Self> {
        let raw: BTreeMap<Dimension, f64> = dimensions
            .iter()
            .map(|d| (*d, d.default_weight()))
            .collect();
        if raw.is_empty() {
            return Err(OptimizerError::RunSetupInvalid(
                "weights must name at least one dimension".to_string(),
            ));
        }
        Ok(Self::normalized(raw))
    }

    /// Rescale non-negative raw weights so they sum to 1.0.
    ///
    /// Falls back to uniform weights when every raw weight is zero.
    pub(crate) fn normalized(raw: BTreeMap<Dimension, f64>) -> Self {
        let sum: f64 = raw.values().sum();
        if sum <= 0.0 || !sum.is_finite() {
            let w = 1.0 / raw.len().max(1) as f64;
            return Self(raw.into_keys().map(|d| (d, w)).collect());
        }
        let mut map: BTreeMap<Dimension, f64> =
            raw.into_iter().map(|(d, w)| (d, w / sum)).collect();

        // Fold rounding residue into the largest weight.
        let residue = 1.0 - map.values().sum::<f64>();
        if residue != 0.0 {
            if let Some(largest) = map
                .values_mut()
                .max_by(|a, b| a.total_cmp(b))
            {
                *largest = (*largest + residue).max(0.0);
            }
        }
        Self(map)
    }

    pub fn get(&self, dimension: Dimension) -> Option<f64> {
        self.0.get(&dimension).copied()
    }

    pub fn dimensions(&self) -> Vec<Dimension> {
        self.0.keys().copied().collect()
    }

    pub fn contains(&self, dimension: Dimension) -> bool {
        self.0.contains_key(&dimension)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        self.0.iter().map(|(d, w)| (*d, *w))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    pub(crate) fn as_map(&self) -> &BTreeMap<Dimension, f64> {
        &self.0
    }

    /// Dot product that ignores dimensions absent from either side.
    ///
    /// Only used once the key sets are known to agree, or for failed
    /// examples whose scores are all zero.
    pub fn dot(&self, scores: &DimensionScores) -> f64 {
        self.0
            .iter()
            .map(|(d, w)| w * scores.get(*d).unwrap_or(0.0))
            .sum()
    }
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self::defaults()
    }
}

impl TryFrom<BTreeMap<Dimension, f64>> for DimensionWeights {
    type Error = OptimizerError;

    fn try_from(value: BTreeMap<Dimension, f64>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DimensionWeights> for BTreeMap<Dimension, f64> {
    fn from(value: DimensionWeights) -> Self {
        value.0
    }
}
