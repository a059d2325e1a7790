//! One reflect-mutate-accept iteration.
//!
//! 1. Select a parent from the frontier (or two, on merge iterations)
//! 2. Sample a minibatch from the feedback pool
//! 3. Score the parent on the minibatch and collect its diagnostics
//! 4. Ask the reflection model for a child instruction
//! 5. Score the child on the same minibatch
//! 6. If the child beats the parent by more than the threshold, score it on
//!    the validation set and offer it to the archive
//!
//! Cancellation is checked between steps. A model call that is already in
//! flight finishes, but its result is dropped.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::RunContext;
use crate::domain::errors::OptimizerError;
use crate::domain::models::{Candidate, EvaluationBatch, Example, ProgressDetail};
use crate::services::budget_tracker::BudgetKind;
use crate::services::pareto_archive::ArchiveEntry;

/// How an iteration ended.
#[derive(Debug)]
pub(super) enum IterationResult {
    /// The iteration ran to the acceptance decision
    Completed {
        detail: ProgressDetail,
        /// Validation mean of an archived child
        validation_mean: Option<f64>,
    },
    /// A model or mutation failure ended the iteration early; it still counts
    Aborted(String),
    /// Cancellation was observed; the iteration does not count
    Cancelled,
    /// A budget ran out mid-iteration; the iteration does not count
    BudgetExhausted(BudgetKind),
}

/// Early exit from an iteration step.
enum Stop {
    Cancelled,
    Budget(BudgetKind),
    Aborted(String),
}

impl From<Stop> for IterationResult {
    fn from(stop: Stop) -> Self {
        match stop {
            Stop::Cancelled => Self::Cancelled,
            Stop::Budget(kind) => Self::BudgetExhausted(kind),
            Stop::Aborted(reason) => Self::Aborted(reason),
        }
    }
}

enum Selection {
    Single(ArchiveEntry),
    Pair(ArchiveEntry, ArchiveEntry),
}

pub(super) async fn run_iteration(ctx: &RunContext, ordinal: u64, rng: &mut StdRng) -> IterationResult {
    match try_iteration(ctx, ordinal, rng).await {
        Ok(result) => result,
        Err(stop) => stop.into(),
    }
}

async fn try_iteration(ctx: &RunContext, ordinal: u64, rng: &mut StdRng) -> Result<IterationResult, Stop> {
    let snapshot = ctx.weights.snapshot().await;
    let weights = &snapshot.weights;
    let merge_turn = ctx
        .config
        .merge_interval
        .is_some_and(|every| every > 0 && ordinal % every == 0);

    let selection = {
        let archive = ctx.archive.lock().await;
        let archive = archive
            .as_ref()
            .ok_or_else(|| Stop::Aborted("archive is not initialized".to_string()))?;
        let pair = if merge_turn {
            archive.select_pair(weights, rng)
        } else {
            None
        };
        match pair {
            Some((first, second)) => Selection::Pair(first, second),
            None => Selection::Single(
                archive
                    .select_parent(weights, rng)
                    .ok_or_else(|| Stop::Aborted("archive frontier is empty".to_string()))?,
            ),
        }
    };

    let size = ctx.config.minibatch_size.min(ctx.feedback_pool.len());
    let minibatch: Vec<Example> = ctx.feedback_pool.choose_multiple(rng, size).cloned().collect();

    // Steps 3-5: produce the child and the parent mean it has to beat
    let (child, parent_mean, child_batch) = match selection {
        Selection::Single(parent) => {
            let parent_batch = evaluate(ctx, &parent.candidate, &minibatch).await?;
            let parent_mean = parent_batch.mean_aggregate(weights).unwrap_or(0.0);
            let feedback = parent_batch.diagnostic_text(weights);
            checkpoint(ctx)?;

            let instruction = ctx
                .mutator
                .mutate(&parent.candidate, &feedback)
                .await
                .map_err(|e| abort(&e, &parent.candidate))?;
            checkpoint(ctx)?;

            let child = Candidate::mutation_of(&parent.candidate, instruction);
            let child_batch = evaluate(ctx, &child, &minibatch).await?;
            (child, parent_mean, child_batch)
        }
        Selection::Pair(first, second) => {
            let first_batch = evaluate(ctx, &first.candidate, &minibatch).await?;
            let second_batch = evaluate(ctx, &second.candidate, &minibatch).await?;
            let parent_mean = first_batch
                .mean_aggregate(weights)
                .unwrap_or(0.0)
                .max(second_batch.mean_aggregate(weights).unwrap_or(0.0));
            checkpoint(ctx)?;

            let instruction = ctx
                .mutator
                .merge(
                    &first.candidate,
                    first.mean_aggregate(weights),
                    &second.candidate,
                    second.mean_aggregate(weights),
                )
                .await
                .map_err(|e| abort(&e, &first.candidate))?;
            checkpoint(ctx)?;

            let child = Candidate::merge_of(&first.candidate, &second.candidate, instruction);
            let child_batch = evaluate(ctx, &child, &minibatch).await?;
            (child, parent_mean, child_batch)
        }
    };

    // Step 6: acceptance gate
    let child_mean = child_batch.mean_aggregate(weights);
    let accepted = child_mean.is_some_and(|mean| mean - parent_mean > ctx.config.acceptance_threshold);
    if !accepted {
        tracing::debug!(
            candidate_id = %child.id,
            parent_mean,
            child_mean,
            "child rejected on minibatch"
        );
        return Ok(IterationResult::Completed {
            detail: ProgressDetail::Rejected {
                candidate_id: child.id,
                parent_mean,
                child_mean,
            },
            validation_mean: None,
        });
    }

    let validation = evaluate(ctx, &child, &ctx.validation_set).await?;
    let validation_mean = validation.mean_aggregate(weights).unwrap_or(0.0);
    checkpoint(ctx)?;

    let candidate_id = child.id;
    let outcome = {
        let mut archive = ctx.archive.lock().await;
        let archive = archive
            .as_mut()
            .ok_or_else(|| Stop::Aborted("archive is not initialized".to_string()))?;
        archive
            .add(child, validation.vectors, weights)
            .map_err(|e| Stop::Aborted(e.to_string()))?
    };

    tracing::info!(
        candidate_id = %candidate_id,
        parent_mean,
        child_mean,
        validation_mean,
        outcome = ?outcome,
        "child accepted"
    );

    Ok(IterationResult::Completed {
        detail: ProgressDetail::Accepted {
            candidate_id,
            archived: outcome.is_accepted(),
            evicted: outcome.evicted(),
        },
        validation_mean: outcome.is_accepted().then_some(validation_mean),
    })
}

/// Reserve budget for and run one evaluation.
async fn evaluate(ctx: &RunContext, candidate: &Candidate, examples: &[Example]) -> Result<EvaluationBatch, Stop> {
    checkpoint(ctx)?;
    ctx.budget
        .reserve_evaluations(examples.len() as u64)
        .map_err(Stop::Budget)?;
    let batch = ctx
        .evaluator
        .evaluate(candidate, examples, &ctx.dimensions, &ctx.cancel)
        .await
        .map_err(|e| match e {
            OptimizerError::Cancelled => Stop::Cancelled,
            other => Stop::Aborted(other.to_string()),
        })?;
    checkpoint(ctx)?;
    Ok(batch)
}

fn checkpoint(ctx: &RunContext) -> Result<(), Stop> {
    if ctx.cancel.is_cancelled() {
        Err(Stop::Cancelled)
    } else {
        Ok(())
    }
}

fn abort(error: &OptimizerError, parent: &Candidate) -> Stop {
    tracing::warn!(parent_id = %parent.id, error = %error, "reflection failed");
    Stop::Aborted(error.to_string())
}
