//! Metric adapters
//!
//! `ReferenceMetric` compares a task output against the example's expected
//! answer using surface text features only, so it needs no model calls.

use std::collections::BTreeSet;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Dimension, DimensionScores, ExecutionTrace};
use crate::domain::ports::{Metric, MetricScore};

/// Scores `successRate`, `quality` and `efficiency` against a reference answer.
///
/// - successRate: 1.0 on a normalized exact match, else 0.0
/// - quality: Jaccard similarity of the lowercase word sets
/// - efficiency: expected length over actual length, capped at 1.0
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceMetric;

impl ReferenceMetric {
    pub fn new() -> Self {
        Self
    }
}

impl Metric for ReferenceMetric {
    fn dimensions(&self) -> Vec<Dimension> {
        vec![Dimension::SuccessRate, Dimension::Quality, Dimension::Efficiency]
    }

    fn score(&self, expected: &str, actual: &str, _trace: &ExecutionTrace) -> DomainResult<MetricScore> {
        let exact = normalize(expected) == normalize(actual);
        let overlap = jaccard(&tokens(expected), &tokens(actual));
        let efficiency = length_ratio(expected, actual);

        let scores = DimensionScores::new()
            .with(Dimension::SuccessRate, if exact { 1.0 } else { 0.0 })
            .with(Dimension::Quality, overlap)
            .with(Dimension::Efficiency, efficiency);

        let mut notes = Vec::new();
        if !exact {
            notes.push(format!(
                "The output did not match the expected answer. Expected: \"{}\". Got: \"{}\".",
                expected.trim(),
                truncate(actual.trim(), 200)
            ));
            if overlap < 0.5 {
                notes.push(format!(
                    "Only {:.0}% of the words overlap with the expected answer.",
                    overlap * 100.0
                ));
            }
        }
        if efficiency < 1.0 {
            notes.push(format!(
                "The output is {:.1}x longer than needed; answer more concisely.",
                1.0 / efficiency.max(f64::EPSILON)
            ));
        }

        Ok(MetricScore::new(scores, notes.join(" ")))
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', '!', '?'])
        .to_lowercase()
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    shared / union
}

fn length_ratio(expected: &str, actual: &str) -> f64 {
    let expected = expected.trim().chars().count().max(1) as f64;
    let actual = actual.trim().chars().count().max(1) as f64;
    (expected / actual).min(1.0)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn trace(output: &str) -> ExecutionTrace {
        ExecutionTrace {
            candidate_id: Uuid::new_v4(),
            example_id: "e1".to_string(),
            instruction: "Answer.".to_string(),
            input: "What is 2+2?".to_string(),
            output: output.to_string(),
            latency_ms: 1,
        }
    }

    #[test]
    fn test_exact_match_scores_perfectly() {
        let metric = ReferenceMetric::new();
        let result = metric.score("Paris.", "  paris ", &trace("paris")).unwrap();
        assert_eq!(result.scores.get(Dimension::SuccessRate), Some(1.0));
        assert_eq!(result.scores.get(Dimension::Quality), Some(1.0));
        assert_eq!(result.scores.get(Dimension::Efficiency), Some(1.0));
        assert!(result.feedback.is_none());
    }

    #[test]
    fn test_verbose_answer_is_penalized_on_efficiency() {
        let metric = ReferenceMetric::new();
        let actual = "The capital of France is Paris";
        let result = metric.score("Paris", actual, &trace(actual)).unwrap();
        assert_eq!(result.scores.get(Dimension::SuccessRate), Some(0.0));

        let quality = result.scores.get(Dimension::Quality).unwrap();
        assert!((quality - 1.0 / 6.0).abs() < 1e-9);

        let efficiency = result.scores.get(Dimension::Efficiency).unwrap();
        assert!((efficiency - 5.0 / 30.0).abs() < 1e-9);

        let feedback = result.feedback.unwrap();
        assert!(feedback.contains("did not match"));
        assert!(feedback.contains("more concisely"));
    }

    #[test]
    fn test_scores_cover_declared_dimensions() {
        let metric = ReferenceMetric::new();
        let result = metric.score("4", "five", &trace("five")).unwrap();
        let mut declared = metric.dimensions();
        declared.sort();
        assert_eq!(result.scores.dimensions(), declared);
        assert_eq!(result.scores.get(Dimension::Quality), Some(0.0));
    }

    #[test]
    fn test_jaccard_of_empty_sets_is_one() {
        assert!((jaccard(&BTreeSet::new(), &BTreeSet::new()) - 1.0).abs() < f64::EPSILON);
    }
}
