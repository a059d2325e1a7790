//! Optimization run controller.
//!
//! Owns the life of one optimization run:
//! 1. Validate the request and resolve the live dimension weights
//! 2. Score the seed instruction on the validation set and archive it
//! 3. Spawn a bounded pool of iteration workers; each claims iterations
//!    from the shared budget and runs the reflect-mutate-accept loop
//! 4. Stop when a budget runs out or the run is cancelled, then publish the
//!    terminal status and the final archive
//!
//! The archive and the bookkeeping each sit behind their own mutex. When both
//! are needed the bookkeeping lock is taken first. No model call is made while
//! either lock is held.

mod handle;
mod iteration;

pub use handle::{ArchivedCandidate, RunHandle, RunOutcome};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use self::iteration::IterationResult;
use super::budget_tracker::{BudgetKind, BudgetTracker};
use super::evaluator::Evaluator;
use super::feedback_mapper::SharedWeights;
use super::pareto_archive::ParetoArchive;
use super::reflective_mutator::ReflectiveMutator;
use crate::domain::errors::{DomainResult, OptimizerError};
use crate::domain::models::{
    Candidate, Dimension, DimensionScores, DimensionWeights, Example, OptimizationRun, OptimizerConfig,
    ProgressDetail, ProgressEvent, RunRequest, RunStatus,
};
use crate::domain::ports::{Metric, ModelClient};

// ============================================================================
// RunController
// ============================================================================

/// Starts optimization runs against a task model, a reflection model and a metric.
#[derive(Clone)]
pub struct RunController {
    config: OptimizerConfig,
    task_model: Arc<dyn ModelClient>,
    reflection_model: Arc<dyn ModelClient>,
    metric: Arc<dyn Metric>,
    weights: Option<DimensionWeights>,
}

impl RunController {
    pub fn new(
        config: OptimizerConfig,
        task_model: Arc<dyn ModelClient>,
        reflection_model: Arc<dyn ModelClient>,
        metric: Arc<dyn Metric>,
    ) -> Self {
        Self {
            config,
            task_model,
            reflection_model,
            metric,
            weights: None,
        }
    }

    /// Initial weights; must cover exactly the metric's dimensions.
    ///
    /// Without this, the default weights restricted to the metric's
    /// dimensions are used.
    pub fn with_weights(mut self, weights: DimensionWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Spawn a run on the current tokio runtime.
    pub fn start(&self, request: RunRequest) -> RunHandle {
        let metric_dimensions = self.metric.dimensions();
        let (weights, weights_error) = self.resolve_weights(&metric_dimensions);

        let run = OptimizationRun::new(request.name.clone());
        let run_id = run.id;
        let (status_tx, status_rx) = watch::channel(run.clone());
        let (events_tx, events_rx) = broadcast::channel(self.config.progress_buffer.max(1));
        let cancel = CancellationToken::new();
        let dimensions = weights.dimensions();
        let shared_weights = SharedWeights::new(weights);

        let ctx = Arc::new(RunContext {
            run_id,
            config: self.config.clone(),
            evaluator: Evaluator::new(self.task_model.clone(), self.metric.clone(), self.config.eval_concurrency),
            mutator: ReflectiveMutator::new(self.reflection_model.clone()),
            weights: shared_weights.clone(),
            dimensions,
            archive: Mutex::new(None),
            run: Mutex::new(run),
            budget: BudgetTracker::from_config(&self.config),
            cancel: cancel.clone(),
            status_tx,
            events_tx: events_tx.clone(),
            feedback_pool: request.feedback_pool.clone(),
            validation_set: request.validation_set.clone(),
        });

        let span = tracing::info_span!("optimization_run", run_id = %run_id, name = %request.name);
        let join = tokio::spawn(drive(ctx, request, weights_error).instrument(span));

        RunHandle::new(run_id, status_rx, events_tx, events_rx, cancel, shared_weights, join)
    }

    /// Start a run and wait for it to finish.
    pub async fn run(&self, request: RunRequest) -> DomainResult<RunOutcome> {
        self.start(request).wait().await
    }

    fn resolve_weights(&self, metric_dimensions: &[Dimension]) -> (DimensionWeights, Option<OptimizerError>) {
        match &self.weights {
            Some(weights) => {
                let mut expected = metric_dimensions.to_vec();
                expected.sort();
                expected.dedup();
                if weights.dimensions() == expected {
                    (weights.clone(), None)
                } else {
                    let err = OptimizerError::RunSetupInvalid(format!(
                        "weights cover [{}] but the metric scores [{}]",
                        join_dimensions(&weights.dimensions()),
                        join_dimensions(&expected)
                    ));
                    (weights.clone(), Some(err))
                }
            }
            None => match DimensionWeights::restricted_to(metric_dimensions) {
                Ok(weights) => (weights, None),
                Err(_) => (
                    DimensionWeights::defaults(),
                    Some(OptimizerError::RunSetupInvalid(
                        "metric declares no dimensions".to_string(),
                    )),
                ),
            },
        }
    }
}

fn join_dimensions(dims: &[Dimension]) -> String {
    dims.iter().map(Dimension::as_str).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// Shared run state
// ============================================================================

/// Why the worker pool stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Budget(BudgetKind),
    Cancelled,
}

struct RunContext {
    run_id: Uuid,
    config: OptimizerConfig,
    evaluator: Evaluator,
    mutator: ReflectiveMutator,
    weights: SharedWeights,
    dimensions: Vec<Dimension>,
    /// Set once the seed has been scored
    archive: Mutex<Option<ParetoArchive>>,
    run: Mutex<OptimizationRun>,
    budget: BudgetTracker,
    cancel: CancellationToken,
    status_tx: watch::Sender<OptimizationRun>,
    events_tx: broadcast::Sender<ProgressEvent>,
    feedback_pool: Vec<Example>,
    validation_set: Vec<Example>,
}

impl RunContext {
    fn validate(&self, request: &RunRequest) -> DomainResult<()> {
        let invalid = |msg: &str| Err(OptimizerError::RunSetupInvalid(msg.to_string()));
        let config = &self.config;

        if request.seed_instruction.trim().is_empty() {
            return invalid("seed instruction must not be empty");
        }
        if request.validation_set.is_empty() {
            return invalid("validation set must not be empty");
        }
        if request.feedback_pool.is_empty() {
            return invalid("feedback example pool must not be empty");
        }
        let mut seen = HashSet::new();
        if !request.validation_set.iter().all(|e| seen.insert(e.id.as_str())) {
            return invalid("validation example ids must be unique");
        }
        if request.feedback_pool.iter().any(|e| seen.contains(e.id.as_str())) {
            return invalid("feedback pool must be disjoint from the validation set");
        }
        if config.minibatch_size == 0 {
            return invalid("minibatch size must be at least 1");
        }
        if config.archive_max_size == 0 {
            return invalid("archive max size must be at least 1");
        }
        if config.concurrency == 0 {
            return invalid("concurrency must be at least 1");
        }
        if !config.acceptance_threshold.is_finite() {
            return invalid("acceptance threshold must be finite");
        }
        if let Some(max) = config.max_evaluation_calls {
            if max < request.validation_set.len() as u64 {
                return Err(OptimizerError::RunSetupInvalid(format!(
                    "evaluation-call budget {max} cannot cover the {} validation examples",
                    request.validation_set.len()
                )));
            }
        }
        Ok(())
    }

    fn publish(&self, run: &OptimizationRun, detail: ProgressDetail, dimension_scores: DimensionScores) {
        let event = ProgressEvent {
            run_id: self.run_id,
            iteration: run.iteration,
            best_score: run.best_score,
            current_dimension_scores: dimension_scores,
            status: run.status,
            detail,
            timestamp: Utc::now(),
        };
        // No subscribers is fine
        let _ = self.events_tx.send(event);
        self.status_tx.send_replace(run.clone());
    }

    /// Per-dimension validation means of the current best entry.
    async fn best_dimension_scores(&self, weights: &DimensionWeights) -> DimensionScores {
        let archive = self.archive.lock().await;
        archive
            .as_ref()
            .and_then(|a| a.best(weights))
            .map(|e| e.dimension_means())
            .unwrap_or_default()
    }

    /// Record a finished iteration and emit its progress event.
    async fn complete_iteration(&self, detail: ProgressDetail, validation_mean: Option<f64>) {
        let snapshot = self.weights.snapshot().await;
        let mut run = self.run.lock().await;
        run.iteration += 1;
        run.evaluation_calls = self.budget.evaluation_calls();
        run.weights_version = snapshot.version;
        if let Some(score) = validation_mean {
            run.observe_score(score);
        }
        let scores = self.best_dimension_scores(&snapshot.weights).await;
        tracing::info!(
            iteration = run.iteration,
            best_score = run.best_score,
            detail = ?detail,
            "iteration complete"
        );
        self.publish(&run, detail, scores);
    }

    async fn finish(&self, status: RunStatus, reason: String) {
        let snapshot = self.weights.snapshot().await;
        let mut run = self.run.lock().await;
        run.evaluation_calls = self.budget.evaluation_calls();
        run.weights_version = snapshot.version;
        let recorded = if status == RunStatus::Failed {
            run.fail(reason.clone())
        } else {
            run.transition_to(status)
        };
        if let Err(e) = recorded {
            tracing::error!(error = %e, "could not record terminal status");
        }
        let scores = self.best_dimension_scores(&snapshot.weights).await;
        let budget = self.budget.state();
        tracing::info!(
            status = %run.status,
            iterations = run.iteration,
            iterations_claimed = budget.iterations_claimed,
            evaluation_calls = budget.evaluation_calls,
            budget_exhausted = budget.exhausted,
            best_score = run.best_score,
            reason = %reason,
            "optimization run finished"
        );
        self.publish(&run, ProgressDetail::Finished { reason }, scores);
    }

    async fn outcome(&self) -> RunOutcome {
        let snapshot = self.weights.snapshot().await;
        let run = self.run.lock().await.clone();
        let archive = self.archive.lock().await;
        RunOutcome::from_archive(run, archive.as_ref(), snapshot.weights)
    }

    /// Score the seed on the validation set and archive it.
    async fn seed_archive(&self, seed_instruction: &str) -> DomainResult<()> {
        let mut archive = ParetoArchive::new(
            self.validation_set.iter().map(|e| e.id.clone()).collect(),
            self.config.archive_max_size,
        )?;
        let seed = Candidate::seed(seed_instruction.trim());

        self.budget
            .reserve_evaluations(self.validation_set.len() as u64)
            .map_err(|kind| OptimizerError::BudgetExhausted(kind.as_str().to_string()))?;
        let batch = self
            .evaluator
            .evaluate(&seed, &self.validation_set, &self.dimensions, &self.cancel)
            .await?;
        if batch.scored_count() == 0 {
            return Err(OptimizerError::RunSetupInvalid(
                "seed evaluation produced no scored examples".to_string(),
            ));
        }

        let snapshot = self.weights.snapshot().await;
        let mean = batch.mean_aggregate(&snapshot.weights).unwrap_or(0.0);
        let seed_id = seed.id;
        let failed = batch.failed_count();
        archive.add(seed, batch.vectors, &snapshot.weights)?;
        tracing::info!(candidate_id = %seed_id, mean_score = mean, failed, "seed archived");

        let mut run = self.run.lock().await;
        *self.archive.lock().await = Some(archive);
        run.evaluation_calls = self.budget.evaluation_calls();
        run.observe_score(mean);
        self.status_tx.send_replace(run.clone());
        Ok(())
    }
}

// ============================================================================
// Run lifecycle
// ============================================================================

async fn drive(ctx: Arc<RunContext>, request: RunRequest, weights_error: Option<OptimizerError>) -> RunOutcome {
    let setup = match weights_error {
        Some(e) => Err(e),
        None => ctx.validate(&request),
    };
    if let Err(e) = setup {
        tracing::error!(error = %e, "run setup invalid");
        ctx.finish(RunStatus::Failed, e.to_string()).await;
        return ctx.outcome().await;
    }

    {
        let mut run = ctx.run.lock().await;
        if let Err(e) = run.transition_to(RunStatus::Running) {
            tracing::error!(error = %e, "could not start run");
        }
        ctx.publish(&run, ProgressDetail::Started, DimensionScores::default());
    }

    match ctx.seed_archive(&request.seed_instruction).await {
        Ok(()) => {}
        Err(OptimizerError::Cancelled) => {
            ctx.finish(RunStatus::Cancelled, "cancelled during seed evaluation".to_string()).await;
            return ctx.outcome().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "seed evaluation failed");
            ctx.finish(RunStatus::Failed, e.to_string()).await;
            return ctx.outcome().await;
        }
    }

    let mut workers = JoinSet::new();
    for worker in 0..ctx.config.concurrency {
        let ctx = ctx.clone();
        workers.spawn(
            worker_loop(ctx, worker).instrument(tracing::debug_span!("worker", worker)),
        );
    }

    let mut stop = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(reason) => {
                // Cancellation outranks budget exhaustion
                if stop != Some(StopReason::Cancelled) {
                    stop = Some(reason);
                }
            }
            Err(e) => tracing::error!(error = %e, "iteration worker panicked"),
        }
    }

    let (status, reason) = match stop {
        _ if ctx.cancel.is_cancelled() => (RunStatus::Cancelled, "cancelled".to_string()),
        Some(StopReason::Budget(kind)) => (RunStatus::Completed, kind.as_str().to_string()),
        Some(StopReason::Cancelled) => (RunStatus::Cancelled, "cancelled".to_string()),
        None => (RunStatus::Failed, "every iteration worker panicked".to_string()),
    };
    ctx.finish(status, reason).await;
    ctx.outcome().await
}

async fn worker_loop(ctx: Arc<RunContext>, worker: usize) -> StopReason {
    let mut rng = match ctx.config.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker as u64)),
        None => StdRng::from_entropy(),
    };

    loop {
        if ctx.cancel.is_cancelled() {
            return StopReason::Cancelled;
        }
        let ordinal = match ctx.budget.claim_iteration() {
            Ok(n) => n,
            Err(kind) => return StopReason::Budget(kind),
        };

        match iteration::run_iteration(&ctx, ordinal, &mut rng).await {
            IterationResult::Completed { detail, validation_mean } => {
                ctx.complete_iteration(detail, validation_mean).await;
            }
            IterationResult::Aborted(reason) => {
                tracing::warn!(ordinal, reason = %reason, "iteration aborted");
                ctx.complete_iteration(ProgressDetail::Aborted { reason }, None).await;
            }
            IterationResult::Cancelled => return StopReason::Cancelled,
            IterationResult::BudgetExhausted(kind) => return StopReason::Budget(kind),
        }
    }
}
