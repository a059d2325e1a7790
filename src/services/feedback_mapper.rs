//! Feedback mapper.
//!
//! Translates discrete end-user feedback (a vote plus an optional reason tag)
//! into additive deltas on dimension weights, and applies those deltas to the
//! live weights of a run. Applying is clamp-then-normalize, done atomically
//! under a write lock so readers only ever see weights that sum to 1.0.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::models::{
    Dimension, DimensionWeights, FeedbackEvent, ReasonTag, TargetType, VoteType, WeightDeltas,
};

// ============================================================================
// Mapping table
// ============================================================================

/// Deltas associated with a reason tag.
pub fn deltas_for(tag: ReasonTag) -> WeightDeltas {
    use Dimension::*;
    let pairs: &[(Dimension, f64)] = match tag {
        ReasonTag::GreatAnswer | ReasonTag::Helpful => &[(Quality, -0.05), (SuccessRate, -0.05)],
        ReasonTag::Perfect => &[(SuccessRate, -0.10), (Quality, -0.10)],
        ReasonTag::WrongAnswer => &[(SuccessRate, 0.15)],
        ReasonTag::TooSlow => &[(Efficiency, 0.15), (Quality, -0.05)],
        ReasonTag::TooVerbose => &[(Efficiency, 0.10), (Quality, -0.03)],
        ReasonTag::Inconsistent => &[(Robustness, 0.15)],
        ReasonTag::SameApproach => &[(Diversity, 0.10), (Innovation, 0.05)],
        ReasonTag::NotInnovative => &[(Innovation, 0.10), (Diversity, 0.05)],
        ReasonTag::DoesntFitCase => &[(Generalization, 0.15)],
        ReasonTag::MissingContext => &[(Quality, 0.10), (Robustness, 0.05)],
        ReasonTag::WrongTool => &[(SuccessRate, 0.10), (Quality, 0.05)],
        ReasonTag::WrongParams => &[(SuccessRate, 0.10)],
        ReasonTag::Unnecessary => &[(Efficiency, 0.10)],
        ReasonTag::NotRelevant => &[(Quality, 0.10), (Generalization, 0.05)],
        ReasonTag::Critical => &[(SuccessRate, -0.10), (Robustness, -0.05)],
        ReasonTag::Outdated => &[(Quality, 0.10)],
        ReasonTag::TooGeneric => &[(Quality, 0.10), (Generalization, -0.05)],
        ReasonTag::IncorrectAssumption => &[(SuccessRate, 0.10), (Quality, 0.05)],
        ReasonTag::MissedConsideration => &[(Quality, 0.10), (Robustness, 0.05)],
        ReasonTag::Overcomplicated => &[(Efficiency, 0.10), (Quality, 0.05)],
        ReasonTag::WrongDirection => &[(SuccessRate, 0.10)],
    };
    pairs.iter().copied().collect()
}

/// Tag used when a vote arrives without a reason.
pub fn default_reason(vote: VoteType, target: TargetType) -> ReasonTag {
    match (vote, target) {
        (VoteType::Up, TargetType::Memory) => ReasonTag::Helpful,
        (VoteType::Up, TargetType::ToolUse) => ReasonTag::Perfect,
        (VoteType::Up, _) => ReasonTag::GreatAnswer,
        (VoteType::Down, TargetType::Memory) => ReasonTag::NotRelevant,
        (VoteType::Down, TargetType::ToolUse) => ReasonTag::WrongTool,
        (VoteType::Down, TargetType::Reasoning) => ReasonTag::WrongDirection,
        (VoteType::Down, _) => ReasonTag::WrongAnswer,
        (VoteType::Critical, _) => ReasonTag::Critical,
    }
}

/// Map one feedback event to weight deltas.
///
/// Unknown reason tags map to an empty delta.
pub fn map_feedback(event: &FeedbackEvent) -> WeightDeltas {
    match event.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => match ReasonTag::parse(reason) {
            Some(tag) => deltas_for(tag),
            None => {
                tracing::debug!(reason, "unknown feedback reason tag, ignoring");
                WeightDeltas::new()
            }
        },
        None => deltas_for(default_reason(event.vote, event.target_type)),
    }
}

/// Mean of the deltas of several events.
pub fn aggregate_feedback(events: &[FeedbackEvent]) -> WeightDeltas {
    if events.is_empty() {
        return WeightDeltas::new();
    }
    let n = events.len() as f64;
    let mut sums: BTreeMap<Dimension, f64> = BTreeMap::new();
    for event in events {
        for (d, v) in map_feedback(event).iter() {
            *sums.entry(d).or_insert(0.0) += v;
        }
    }
    sums.into_iter().map(|(d, v)| (d, v / n)).collect()
}

/// Add `deltas` to `weights`, clamp at zero, and renormalize.
///
/// Deltas on dimensions outside the weight vector's key set are dropped.
pub fn apply_adjustment(weights: &DimensionWeights, deltas: &WeightDeltas) -> DimensionWeights {
    let raw: BTreeMap<Dimension, f64> = weights
        .iter()
        .map(|(d, w)| (d, (w + deltas.get(d)).max(0.0)))
        .collect();
    normalize(raw)
}

/// Rescale non-negative weights to sum to 1.0; all-zero input becomes uniform.
pub fn normalize(raw: BTreeMap<Dimension, f64>) -> DimensionWeights {
    DimensionWeights::normalized(raw)
}

// ============================================================================
// Live weights
// ============================================================================

/// A versioned read of the live weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsSnapshot {
    pub version: u64,
    pub weights: DimensionWeights,
}

/// Result of ingesting one feedback event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    /// Deltas actually applied (restricted to the active dimensions)
    pub deltas: WeightDeltas,
    pub weights: DimensionWeights,
    pub version: u64,
}

/// Live dimension weights shared between the run controller and feedback ingestion.
#[derive(Debug, Clone)]
pub struct SharedWeights {
    inner: Arc<RwLock<WeightsSnapshot>>,
}

impl SharedWeights {
    pub fn new(weights: DimensionWeights) -> Self {
        Self {
            inner: Arc::new(RwLock::new(WeightsSnapshot { version: 0, weights })),
        }
    }

    pub async fn snapshot(&self) -> WeightsSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn dimensions(&self) -> Vec<Dimension> {
        self.inner.read().await.weights.dimensions()
    }

    /// Map and apply one feedback event.
    pub async fn apply_feedback(&self, event: &FeedbackEvent) -> FeedbackOutcome {
        self.apply_deltas(&map_feedback(event)).await
    }

    /// Apply raw deltas; an empty delta leaves the version unchanged.
    pub async fn apply_deltas(&self, deltas: &WeightDeltas) -> FeedbackOutcome {
        let mut state = self.inner.write().await;
        let active = state.weights.dimensions();
        let deltas = deltas.restricted_to(&active);
        if !deltas.is_empty() {
            state.weights = apply_adjustment(&state.weights, &deltas);
            state.version += 1;
            tracing::debug!(version = state.version, "dimension weights adjusted");
        }
        FeedbackOutcome {
            deltas,
            weights: state.weights.clone(),
            version: state.version,
        }
    }
}
