//! Integration tests for the optimization run controller
//!
//! These drive complete runs with scripted task and reflection models and
//! the built-in reference metric.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    concise_task_model, config, examples, fixed_reflection_model, request, sequenced_reflection_model,
    setup_test_logging,
};
use prompt_evolve::adapters::llm::ScriptedModelClient;
use prompt_evolve::adapters::metrics::ReferenceMetric;
use prompt_evolve::domain::models::{
    CandidateOrigin, Dimension, DimensionWeights, FeedbackEvent, ProgressDetail, ProgressEvent, RunRequest,
    RunStatus, VoteType,
};
use prompt_evolve::services::{RunController, RunOutcome};
use tokio::sync::broadcast;

const CONCISE: &str = "Answer concisely with only the capital city.";

fn controller(
    optimizer: prompt_evolve::domain::models::OptimizerConfig,
    task: ScriptedModelClient,
    reflection: ScriptedModelClient,
) -> RunController {
    RunController::new(
        optimizer,
        Arc::new(task),
        Arc::new(reflection),
        Arc::new(ReferenceMetric::new()),
    )
}

fn drain(mut rx: broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn finished_reason(events: &[ProgressEvent]) -> String {
    match events.last().map(|e| &e.detail) {
        Some(ProgressDetail::Finished { reason }) => reason.clone(),
        other => panic!("last event should be Finished, got {other:?}"),
    }
}

async fn run_to_end(controller: &RunController, request: RunRequest) -> (RunOutcome, Vec<ProgressEvent>) {
    let mut handle = controller.start(request);
    let events = handle.take_events().expect("events available once");
    let outcome = handle.wait().await.expect("run task should not panic");
    (outcome, drain(events))
}

#[tokio::test]
async fn test_reflection_improves_seed() {
    setup_test_logging();
    let controller = controller(config(5), concise_task_model(), fixed_reflection_model(CONCISE));

    let (outcome, events) = run_to_end(&controller, request("Answer the question.")).await;

    assert_eq!(outcome.run.status, RunStatus::Completed);
    assert_eq!(outcome.run.iteration, 5);
    assert_eq!(outcome.best_instruction(), Some(CONCISE));
    assert!((outcome.run.best_score.unwrap() - 1.0).abs() < 1e-9);

    // Seed on validation, then one accepted iteration, then four that
    // evaluate the parent before the reflection repeats it unchanged.
    assert_eq!(outcome.run.evaluation_calls, 3 + (2 + 2 + 3) + 4 * 2);

    assert_eq!(outcome.archive.len(), 2);
    let frontier: Vec<_> = outcome.frontier().collect();
    assert_eq!(frontier.len(), 1);
    assert_eq!(frontier[0].entry.candidate.instruction, CONCISE);
    assert_eq!(frontier[0].win_count, 3);
    assert_eq!(frontier[0].entry.candidate.generation, 1);

    let accepted = events
        .iter()
        .filter(|e| matches!(e.detail, ProgressDetail::Accepted { archived: true, .. }))
        .count();
    let aborted = events
        .iter()
        .filter(|e| matches!(e.detail, ProgressDetail::Aborted { .. }))
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(aborted, 4);
    assert_eq!(finished_reason(&events), "iteration budget exhausted");
}

#[tokio::test]
async fn test_gate_never_admits_non_improving_child() {
    let controller = controller(
        config(4),
        concise_task_model(),
        fixed_reflection_model("Please answer the question."),
    );

    let (outcome, events) = run_to_end(&controller, request("Answer the question.")).await;

    assert_eq!(outcome.run.status, RunStatus::Completed);
    assert_eq!(outcome.archive.len(), 1);
    assert_eq!(outcome.best_instruction(), Some("Answer the question."));
    let rejected: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.detail {
            ProgressDetail::Rejected {
                parent_mean,
                child_mean,
                ..
            } => Some((*parent_mean, *child_mean)),
            _ => None,
        })
        .collect();
    assert_eq!(rejected.len(), 4);
    for (parent, child) in rejected {
        assert!(child.unwrap() <= parent);
    }
}

#[tokio::test]
async fn test_merge_combines_frontier_specialists() {
    // Alpha is right on countries starting with S, beta on the rest;
    // neither dominates the other on validation, so iteration 3 merges them.
    let task = ScriptedModelClient::from_fn("task", |instruction, input| {
        let alpha = instruction.contains("alpha") && input.starts_with('S');
        let beta = instruction.contains("beta") && !input.starts_with('S');
        if alpha || beta {
            Ok(common::capital(input).to_string())
        } else {
            Ok(common::verbose_answer(input))
        }
    });
    let reflection = sequenced_reflection_model(vec!["alpha", "beta"], "alpha beta");
    let optimizer = prompt_evolve::domain::models::OptimizerConfig {
        minibatch_size: 3,
        merge_interval: Some(3),
        ..config(3)
    };
    let request = RunRequest {
        name: "specialists".to_string(),
        seed_instruction: "Answer.".to_string(),
        feedback_pool: examples("f", &["Spain", "France", "Italy"]),
        validation_set: examples("v", &["Spain", "Japan"]),
    };

    let (outcome, _) = run_to_end(&controller(optimizer, task, reflection), request).await;

    assert_eq!(outcome.run.status, RunStatus::Completed);
    assert_eq!(outcome.run.iteration, 3);
    assert_eq!(outcome.archive.len(), 4);

    let best = outcome.best.as_ref().expect("archive is not empty");
    assert_eq!(best.entry.candidate.instruction, "alpha beta");
    assert_eq!(best.entry.candidate.origin, CandidateOrigin::Merge);
    assert_eq!(best.entry.candidate.parent_ids.len(), 2);
    assert!(best.on_frontier);
}

#[tokio::test]
async fn test_setup_failures_end_run_as_failed() {
    let mut no_validation = request("Answer the question.");
    no_validation.validation_set.clear();
    let (outcome, events) = run_to_end(
        &controller(config(3), concise_task_model(), fixed_reflection_model(CONCISE)),
        no_validation,
    )
    .await;
    assert_eq!(outcome.run.status, RunStatus::Failed);
    assert!(outcome.run.failure_reason.unwrap().contains("validation set"));
    assert!(outcome.archive.is_empty());
    assert_eq!(events.len(), 1);

    let mismatched = controller(config(3), concise_task_model(), fixed_reflection_model(CONCISE))
        .with_weights(DimensionWeights::uniform(&[Dimension::Quality]).unwrap());
    let (outcome, _) = run_to_end(&mismatched, request("Answer the question.")).await;
    assert_eq!(outcome.run.status, RunStatus::Failed);
    assert!(outcome.run.failure_reason.unwrap().contains("weights cover"));

    let mut overlapping = request("Answer the question.");
    overlapping.feedback_pool.push(overlapping.validation_set[0].clone());
    let (outcome, _) = run_to_end(
        &controller(config(3), concise_task_model(), fixed_reflection_model(CONCISE)),
        overlapping,
    )
    .await;
    assert_eq!(outcome.run.status, RunStatus::Failed);
    assert!(outcome.run.failure_reason.unwrap().contains("disjoint"));

    let too_small = prompt_evolve::domain::models::OptimizerConfig {
        max_evaluation_calls: Some(2),
        ..config(3)
    };
    let (outcome, _) = run_to_end(
        &controller(too_small, concise_task_model(), fixed_reflection_model(CONCISE)),
        request("Answer the question."),
    )
    .await;
    assert_eq!(outcome.run.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_seed_without_scored_examples_fails_run() {
    let broken_task = ScriptedModelClient::new("task");
    let (outcome, _) = run_to_end(
        &controller(config(3), broken_task, fixed_reflection_model(CONCISE)),
        request("Answer the question."),
    )
    .await;

    assert_eq!(outcome.run.status, RunStatus::Failed);
    assert!(outcome.run.failure_reason.unwrap().contains("no scored examples"));
    assert_eq!(outcome.run.iteration, 0);
}

#[tokio::test]
async fn test_evaluation_budget_completes_run() {
    let optimizer = prompt_evolve::domain::models::OptimizerConfig {
        max_evaluation_calls: Some(10),
        ..config(100)
    };
    let (outcome, events) = run_to_end(
        &controller(optimizer, concise_task_model(), fixed_reflection_model(CONCISE)),
        request("Answer the question."),
    )
    .await;

    // Seed (3) + parent (2) + child (2) + child validation (3) = 10; the
    // next parent evaluation no longer fits.
    assert_eq!(outcome.run.status, RunStatus::Completed);
    assert_eq!(outcome.run.iteration, 1);
    assert_eq!(outcome.run.evaluation_calls, 10);
    assert_eq!(finished_reason(&events), "evaluation-call budget exhausted");
}

#[tokio::test]
async fn test_progress_events_are_strictly_increasing() {
    let optimizer = prompt_evolve::domain::models::OptimizerConfig {
        concurrency: 4,
        ..config(12)
    };
    let (outcome, events) = run_to_end(
        &controller(optimizer, concise_task_model(), fixed_reflection_model(CONCISE)),
        request("Answer the question."),
    )
    .await;

    assert_eq!(outcome.run.iteration, 12);
    assert!(matches!(events.first().map(|e| &e.detail), Some(ProgressDetail::Started)));
    assert_eq!(events.first().unwrap().iteration, 0);

    let iterations: Vec<u64> = events
        .iter()
        .filter(|e| !matches!(e.detail, ProgressDetail::Started | ProgressDetail::Finished { .. }))
        .map(|e| e.iteration)
        .collect();
    assert_eq!(iterations, (1..=12).collect::<Vec<_>>());

    let last = events.last().unwrap();
    assert_eq!(last.iteration, 12);
    assert_eq!(last.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_cancellation_keeps_archive() {
    let task = concise_task_model().with_delay(Duration::from_millis(20));
    let handle = controller(config(10_000), task, fixed_reflection_model(CONCISE)).start(request("Answer the question."));

    let mut watch = handle.watch();
    tokio::time::timeout(Duration::from_secs(10), watch.wait_for(|run| run.iteration >= 1))
        .await
        .expect("first iteration should complete")
        .expect("run should still be publishing");

    handle.cancel();
    let outcome = handle.wait().await.unwrap();

    assert_eq!(outcome.run.status, RunStatus::Cancelled);
    assert!(outcome.run.iteration >= 1 && outcome.run.iteration < 10_000);
    assert!(!outcome.archive.is_empty());
    assert!(outcome.best_instruction().is_some());
    assert!(outcome.run.finished_at.is_some());
}

#[tokio::test]
async fn test_feedback_adjusts_live_weights() {
    let task = concise_task_model().with_delay(Duration::from_millis(5));
    let handle = controller(config(3), task, fixed_reflection_model(CONCISE)).start(request("Answer the question."));

    let before = handle.weights().await;
    assert_eq!(before.version, 0);
    assert_eq!(
        before.weights.dimensions(),
        vec![Dimension::SuccessRate, Dimension::Quality, Dimension::Efficiency]
    );

    let outcome = handle
        .ingest_feedback(&FeedbackEvent::new(VoteType::Down, Some("too_verbose")))
        .await;
    assert_eq!(outcome.version, 1);
    let efficiency_before = before.weights.get(Dimension::Efficiency).unwrap();
    let quality_before = before.weights.get(Dimension::Quality).unwrap();
    assert!(outcome.weights.get(Dimension::Efficiency).unwrap() > efficiency_before);
    assert!(outcome.weights.get(Dimension::Quality).unwrap() < quality_before);
    assert!((outcome.weights.sum() - 1.0).abs() < 1e-9);

    // Tags outside the active dimensions leave the weights alone
    let unchanged = handle
        .ingest_feedback(&FeedbackEvent::new(VoteType::Down, Some("inconsistent")))
        .await;
    assert_eq!(unchanged.version, 1);
    assert!(unchanged.deltas.is_empty());

    let result = handle.wait().await.unwrap();
    assert_eq!(result.run.weights_version, 1);
    assert_eq!(result.weights, outcome.weights);
}

#[tokio::test]
async fn test_records_flatten_outcome() {
    let (outcome, _) = run_to_end(
        &controller(config(2), concise_task_model(), fixed_reflection_model(CONCISE)),
        request("Answer the question."),
    )
    .await;

    let records = outcome.records();
    assert_eq!(records.run.run_id, outcome.run.id);
    assert_eq!(records.run.status, RunStatus::Completed);
    assert_eq!(records.candidates.len(), 2);
    // 2 candidates x 3 validation examples x 3 dimensions
    assert_eq!(records.scores.len(), 18);
    assert_eq!(records.archive.len(), 2);
    assert_eq!(records.archive.iter().filter(|a| a.on_frontier).count(), 1);

    let best_id = records.run.best_candidate_id.unwrap();
    let best = records.candidates.iter().find(|c| c.candidate_id == best_id).unwrap();
    assert_eq!(best.instruction, CONCISE);
    assert_eq!(best.origin, CandidateOrigin::Mutation);
    assert_eq!(best.parent_ids.len(), 1);

    let json = serde_json::to_value(&records).unwrap();
    assert!(json["scores"].as_array().unwrap().len() == 18);
}
