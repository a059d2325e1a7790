//! Evaluator.
//!
//! Runs a candidate instruction over a list of examples through the task
//! model and scores each output with the metric. A failing example never
//! aborts the batch: it is recorded as a zero score vector tagged with the
//! failure reason.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainResult, OptimizerError};
use crate::domain::models::{Candidate, Dimension, EvaluationBatch, Example, ExecutionTrace, ScoreVector};
use crate::domain::ports::{Metric, ModelClient};

/// Executes candidates against examples.
#[derive(Clone)]
pub struct Evaluator {
    task_model: Arc<dyn ModelClient>,
    metric: Arc<dyn Metric>,
    concurrency: usize,
}

impl Evaluator {
    pub fn new(task_model: Arc<dyn ModelClient>, metric: Arc<dyn Metric>, concurrency: usize) -> Self {
        Self {
            task_model,
            metric,
            concurrency: concurrency.max(1),
        }
    }

    pub fn metric_dimensions(&self) -> Vec<Dimension> {
        self.metric.dimensions()
    }

    /// Evaluate `candidate` on `examples`, one score vector per example in order.
    ///
    /// Every produced score vector covers exactly `dimensions`; metric output
    /// with any other key set is recorded as a failed example. Returns
    /// `Cancelled` if `cancel` fires before every example has been launched.
    pub async fn evaluate(
        &self,
        candidate: &Candidate,
        examples: &[Example],
        dimensions: &[Dimension],
        cancel: &CancellationToken,
    ) -> DomainResult<EvaluationBatch> {
        let pending: Vec<_> = examples
            .iter()
            .map(|example| self.evaluate_one(candidate, example, dimensions, cancel))
            .collect();
        let results: Vec<Option<ScoreVector>> = stream::iter(pending).buffered(self.concurrency).collect().await;

        let vectors: Option<Vec<ScoreVector>> = results.into_iter().collect();
        let vectors = vectors.ok_or(OptimizerError::Cancelled)?;

        Ok(EvaluationBatch {
            candidate_id: candidate.id,
            vectors,
        })
    }

    /// `None` when the run was cancelled before this example started.
    async fn evaluate_one(
        &self,
        candidate: &Candidate,
        example: &Example,
        dimensions: &[Dimension],
        cancel: &CancellationToken,
    ) -> Option<ScoreVector> {
        if cancel.is_cancelled() {
            return None;
        }
        Some(self.run_and_score(candidate, example, dimensions).await)
    }

    async fn run_and_score(&self, candidate: &Candidate, example: &Example, dimensions: &[Dimension]) -> ScoreVector {
        let started = Instant::now();
        let output = match self.task_model.generate(&candidate.instruction, &example.input).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(
                    candidate_id = %candidate.id,
                    example_id = %example.id,
                    model = self.task_model.model_id(),
                    error = %e,
                    "task model call failed"
                );
                return ScoreVector::failed(&example.id, dimensions, e.to_string());
            }
        };

        let trace = ExecutionTrace {
            candidate_id: candidate.id,
            example_id: example.id.clone(),
            instruction: candidate.instruction.clone(),
            input: example.input.clone(),
            output,
            latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        match self.metric.score(&example.expected, &trace.output, &trace) {
            Ok(result) => {
                let produced = result.scores.dimensions();
                let mut expected = dimensions.to_vec();
                expected.sort();
                if produced != expected {
                    let err = OptimizerError::DimensionMismatch {
                        expected: dimensions.to_vec(),
                        actual: produced,
                    };
                    tracing::warn!(
                        candidate_id = %candidate.id,
                        example_id = %example.id,
                        error = %err,
                        "metric produced unexpected dimensions"
                    );
                    return ScoreVector::failed(&example.id, dimensions, err.to_string());
                }
                if let Some((dimension, value)) = result.scores.iter().find(|(_, v)| !(0.0..=1.0).contains(v)) {
                    let reason = format!("metric score {value} for {dimension} is outside [0, 1]");
                    tracing::warn!(
                        candidate_id = %candidate.id,
                        example_id = %example.id,
                        dimension = %dimension,
                        score = value,
                        "metric produced an out-of-range score"
                    );
                    return ScoreVector::failed(&example.id, dimensions, reason);
                }
                ScoreVector::scored(&example.id, result.scores, result.feedback)
            }
            Err(e) => {
                tracing::warn!(
                    candidate_id = %candidate.id,
                    example_id = %example.id,
                    error = %e,
                    "metric failed"
                );
                ScoreVector::failed(&example.id, dimensions, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::llm::ScriptedModelClient;
    use crate::domain::models::{DimensionScores, DimensionWeights};
    use crate::domain::ports::{MetricScore, ModelError};

    /// Scores 1.0 on successRate when the output equals the expected text.
    struct ExactMetric;

    impl Metric for ExactMetric {
        fn dimensions(&self) -> Vec<Dimension> {
            vec![Dimension::SuccessRate]
        }

        fn score(&self, expected: &str, actual: &str, _trace: &ExecutionTrace) -> DomainResult<MetricScore> {
            let hit = if expected == actual { 1.0 } else { 0.0 };
            Ok(MetricScore::new(
                DimensionScores::new().with(Dimension::SuccessRate, hit),
                format!("expected {expected:?}, got {actual:?}"),
            ))
        }
    }

    /// Returns a fixed score regardless of the output.
    struct ConstantMetric(f64);

    impl Metric for ConstantMetric {
        fn dimensions(&self) -> Vec<Dimension> {
            vec![Dimension::SuccessRate]
        }

        fn score(&self, _expected: &str, _actual: &str, _trace: &ExecutionTrace) -> DomainResult<MetricScore> {
            Ok(MetricScore::new(
                DimensionScores::new().with(Dimension::SuccessRate, self.0),
                "constant",
            ))
        }
    }

    fn examples() -> Vec<Example> {
        vec![
            Example::new("a", "1+1", "2"),
            Example::new("b", "2+2", "4"),
            Example::new("c", "3+3", "6"),
        ]
    }

    #[tokio::test]
    async fn test_failed_example_does_not_abort_batch() {
        let model = ScriptedModelClient::new("task")
            .with_reply("1+1", "2")
            .with_error("2+2", ModelError::Timeout(5))
            .with_reply("3+3", "7");
        let evaluator = Evaluator::new(Arc::new(model), Arc::new(ExactMetric), 2);
        let candidate = Candidate::seed("Add the numbers.");

        let batch = evaluator
            .evaluate(&candidate, &examples(), &[Dimension::SuccessRate], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(batch.vectors.len(), 3);
        assert_eq!(batch.vectors[0].example_id, "a");
        assert!(!batch.vectors[0].is_failed());
        assert!(batch.vectors[1].is_failed());
        assert_eq!(batch.vectors[1].scores.get(Dimension::SuccessRate), Some(0.0));
        assert_eq!(batch.vectors[2].scores.get(Dimension::SuccessRate), Some(0.0));

        let weights = DimensionWeights::from_named([("successRate", 1.0)]).unwrap();
        assert_eq!(batch.mean_aggregate(&weights), Some(0.5));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_marks_example_failed() {
        let model = ScriptedModelClient::new("task").with_default_reply("2");
        let evaluator = Evaluator::new(Arc::new(model), Arc::new(ExactMetric), 1);
        let candidate = Candidate::seed("Add the numbers.");

        let batch = evaluator
            .evaluate(
                &candidate,
                &examples()[..1],
                &[Dimension::SuccessRate, Dimension::Quality],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(batch.vectors[0].is_failed());
        assert_eq!(batch.vectors[0].scores.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_launch() {
        let model = ScriptedModelClient::new("task").with_default_reply("2");
        let evaluator = Evaluator::new(Arc::new(model), Arc::new(ExactMetric), 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = evaluator
            .evaluate(&Candidate::seed("x"), &examples(), &[Dimension::SuccessRate], &cancel)
            .await;
        assert!(matches!(result, Err(OptimizerError::Cancelled)));
    }

    #[tokio::test]
    async fn test_non_finite_or_out_of_range_scores_mark_example_failed() {
        for bad in [f64::NAN, 7.5, -0.25, f64::INFINITY] {
            let model = ScriptedModelClient::new("task").with_default_reply("2");
            let evaluator = Evaluator::new(Arc::new(model), Arc::new(ConstantMetric(bad)), 1);

            let batch = evaluator
                .evaluate(&Candidate::seed("x"), &examples()[..2], &[Dimension::SuccessRate], &CancellationToken::new())
                .await
                .unwrap();

            assert!(batch.vectors.iter().all(ScoreVector::is_failed), "score {bad} was accepted");
            assert!(batch.vectors.iter().all(|v| v.scores.get(Dimension::SuccessRate) == Some(0.0)));
        }
    }

    #[tokio::test]
    async fn test_boundary_scores_are_accepted() {
        for edge in [0.0, 1.0] {
            let model = ScriptedModelClient::new("task").with_default_reply("2");
            let evaluator = Evaluator::new(Arc::new(model), Arc::new(ConstantMetric(edge)), 1);

            let batch = evaluator
                .evaluate(&Candidate::seed("x"), &examples()[..1], &[Dimension::SuccessRate], &CancellationToken::new())
                .await
                .unwrap();

            assert!(!batch.vectors[0].is_failed());
            assert_eq!(batch.vectors[0].scores.get(Dimension::SuccessRate), Some(edge));
        }
    }
}
