//! Metric port
//!
//! A metric turns one task-model output into per-dimension scores plus
//! free-text diagnostics the reflection model can act on. Metrics are
//! deterministic for a given (expected, actual, trace).

use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::{Dimension, DimensionScores, ExecutionTrace};

/// Output of a single metric call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    pub scores: DimensionScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl MetricScore {
    pub fn new(scores: DimensionScores, feedback: impl Into<String>) -> Self {
        let feedback = feedback.into();
        Self {
            scores,
            feedback: (!feedback.is_empty()).then_some(feedback),
        }
    }
}

pub trait Metric: Send + Sync {
    /// Dimensions every score produced by this metric covers
    fn dimensions(&self) -> Vec<Dimension>;

    /// Score `actual` against `expected`.
    fn score(&self, expected: &str, actual: &str, trace: &ExecutionTrace) -> DomainResult<MetricScore>;
}
