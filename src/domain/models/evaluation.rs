//! Examples, execution traces, and score vectors.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

use super::dimension::{Dimension, DimensionScores, DimensionWeights};

/// One task example: an input and the output the task is expected to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub id: String,
    pub input: String,
    #[serde(default)]
    pub expected: String,
}

impl Example {
    pub fn new(id: impl Into<String>, input: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            expected: expected.into(),
        }
    }
}

/// Record of a single task-model execution, handed to the metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub candidate_id: Uuid,
    pub example_id: String,
    pub instruction: String,
    pub input: String,
    pub output: String,
    pub latency_ms: u64,
}

/// Whether an example produced usable scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationStatus {
    Scored,
    /// The example could not be scored; its scores are all zero.
    Failed { reason: String },
}

/// Scores for one (candidate, example) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreVector {
    pub example_id: String,
    pub scores: DimensionScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub status: EvaluationStatus,
}

impl ScoreVector {
    pub fn scored(example_id: impl Into<String>, scores: DimensionScores, feedback: Option<String>) -> Self {
        Self {
            example_id: example_id.into(),
            scores,
            feedback,
            status: EvaluationStatus::Scored,
        }
    }

    /// Zero scores over `dimensions`, tagged with the failure reason.
    pub fn failed(example_id: impl Into<String>, dimensions: &[Dimension], reason: impl Into<String>) -> Self {
        Self {
            example_id: example_id.into(),
            scores: DimensionScores::zeroed(dimensions),
            feedback: None,
            status: EvaluationStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, EvaluationStatus::Failed { .. })
    }

    /// Weighted aggregate; failed examples aggregate to 0.0.
    pub fn aggregate(&self, weights: &DimensionWeights) -> f64 {
        if self.is_failed() {
            0.0
        } else {
            weights.dot(&self.scores)
        }
    }
}

/// Score vectors of one candidate over an ordered list of examples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationBatch {
    pub candidate_id: Uuid,
    pub vectors: Vec<ScoreVector>,
}

impl EvaluationBatch {
    pub fn scored_count(&self) -> usize {
        self.vectors.iter().filter(|v| !v.is_failed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.vectors.len() - self.scored_count()
    }

    /// Mean aggregate over scored examples, `None` if nothing scored.
    pub fn mean_aggregate(&self, weights: &DimensionWeights) -> Option<f64> {
        let scored: Vec<f64> = self
            .vectors
            .iter()
            .filter(|v| !v.is_failed())
            .map(|v| v.aggregate(weights))
            .collect();
        if scored.is_empty() {
            None
        } else {
            Some(scored.iter().sum::<f64>() / scored.len() as f64)
        }
    }

    /// Diagnostic text for the reflection model, one block per example.
    pub fn diagnostic_text(&self, weights: &DimensionWeights) -> String {
        let mut out = String::new();
        for v in &self.vectors {
            match &v.status {
                EvaluationStatus::Scored => {
                    let _ = writeln!(out, "Example {} (score {:.3}):", v.example_id, v.aggregate(weights));
                    match v.feedback.as_deref() {
                        Some(text) if !text.trim().is_empty() => {
                            let _ = writeln!(out, "{}", text.trim());
                        }
                        _ => {
                            let _ = writeln!(out, "(no diagnostic feedback)");
                        }
                    }
                }
                EvaluationStatus::Failed { reason } => {
                    let _ = writeln!(out, "Example {} (failed): {}", v.example_id, reason);
                }
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> DimensionWeights {
        DimensionWeights::from_named([("successRate", 1.0)]).unwrap()
    }

    #[test]
    fn test_mean_excludes_failed_examples() {
        let batch = EvaluationBatch {
            candidate_id: Uuid::new_v4(),
            vectors: vec![
                ScoreVector::scored("a", DimensionScores::new().with(Dimension::SuccessRate, 0.8), None),
                ScoreVector::failed("b", &[Dimension::SuccessRate], "timeout"),
                ScoreVector::scored("c", DimensionScores::new().with(Dimension::SuccessRate, 0.4), None),
            ],
        };
        let mean = batch.mean_aggregate(&weights()).unwrap();
        assert!((mean - 0.6).abs() < 1e-12);
        assert_eq!(batch.failed_count(), 1);
    }

    #[test]
    fn test_mean_is_none_when_everything_failed() {
        let batch = EvaluationBatch {
            candidate_id: Uuid::new_v4(),
            vectors: vec![ScoreVector::failed("a", &[Dimension::SuccessRate], "boom")],
        };
        assert_eq!(batch.mean_aggregate(&weights()), None);
    }

    #[test]
    fn test_diagnostic_text_includes_feedback_and_failures() {
        let batch = EvaluationBatch {
            candidate_id: Uuid::new_v4(),
            vectors: vec![
                ScoreVector::scored(
                    "q1",
                    DimensionScores::new().with(Dimension::SuccessRate, 0.5),
                    Some("Answer was too long.".to_string()),
                ),
                ScoreVector::failed("q2", &[Dimension::SuccessRate], "model timeout"),
            ],
        };
        let text = batch.diagnostic_text(&weights());
        assert!(text.contains("Example q1 (score 0.500):"));
        assert!(text.contains("Answer was too long."));
        assert!(text.contains("Example q2 (failed): model timeout"));
    }
}
