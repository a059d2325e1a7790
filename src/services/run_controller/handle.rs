//! Handle to a running optimization and its final outcome.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::{DomainResult, OptimizerError};
use crate::domain::models::{
    ArchiveMembershipRecord, CandidateRecord, DimensionWeights, FeedbackEvent, OptimizationRun, ProgressEvent,
    RunRecord, RunRecords, RunStatus, ScoreRecord,
};
use crate::services::feedback_mapper::{FeedbackOutcome, SharedWeights, WeightsSnapshot};
use crate::services::pareto_archive::{ArchiveEntry, ParetoArchive};

/// Control surface for a spawned run.
///
/// Status queries are synchronous and never wait on the run's locks.
pub struct RunHandle {
    run_id: Uuid,
    status_rx: watch::Receiver<OptimizationRun>,
    events_tx: broadcast::Sender<ProgressEvent>,
    initial_events: Option<broadcast::Receiver<ProgressEvent>>,
    cancel: CancellationToken,
    weights: SharedWeights,
    join: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub(super) fn new(
        run_id: Uuid,
        status_rx: watch::Receiver<OptimizationRun>,
        events_tx: broadcast::Sender<ProgressEvent>,
        initial_events: broadcast::Receiver<ProgressEvent>,
        cancel: CancellationToken,
        weights: SharedWeights,
        join: JoinHandle<RunOutcome>,
    ) -> Self {
        Self {
            run_id,
            status_rx,
            events_tx,
            initial_events: Some(initial_events),
            cancel,
            weights,
            join,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Latest published run bookkeeping.
    pub fn snapshot(&self) -> OptimizationRun {
        self.status_rx.borrow().clone()
    }

    pub fn status(&self) -> RunStatus {
        self.status_rx.borrow().status
    }

    /// Progress feed from the moment the run was spawned; available once.
    pub fn take_events(&mut self) -> Option<broadcast::Receiver<ProgressEvent>> {
        self.initial_events.take()
    }

    /// Progress feed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events_tx.subscribe()
    }

    /// A watch on the run bookkeeping, for callers that poll.
    pub fn watch(&self) -> watch::Receiver<OptimizationRun> {
        self.status_rx.clone()
    }

    /// Request cooperative cancellation. The archive built so far is kept.
    pub fn cancel(&self) {
        tracing::info!(run_id = %self.run_id, "cancellation requested");
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Apply one feedback event to the live weights; the next iteration sees it.
    pub async fn ingest_feedback(&self, event: &FeedbackEvent) -> FeedbackOutcome {
        let outcome = self.weights.apply_feedback(event).await;
        tracing::info!(
            run_id = %self.run_id,
            vote = event.vote.as_str(),
            reason = event.reason.as_deref().unwrap_or(""),
            version = outcome.version,
            "feedback ingested"
        );
        outcome
    }

    pub async fn weights(&self) -> WeightsSnapshot {
        self.weights.snapshot().await
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to reach a terminal state.
    pub async fn wait(self) -> DomainResult<RunOutcome> {
        self.join
            .await
            .map_err(|e| OptimizerError::Internal(format!("run task failed: {e}")))
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// An archive entry with its standing at the end of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedCandidate {
    pub entry: ArchiveEntry,
    pub on_frontier: bool,
    pub win_count: u32,
    pub mean_aggregate: f64,
}

/// Final state of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run: OptimizationRun,
    /// Highest mean aggregate on the validation set, latest insertion on ties
    pub best: Option<ArchivedCandidate>,
    /// Archive in insertion order
    pub archive: Vec<ArchivedCandidate>,
    pub weights: DimensionWeights,
}

impl RunOutcome {
    pub(super) fn from_archive(run: OptimizationRun, archive: Option<&ParetoArchive>, weights: DimensionWeights) -> Self {
        let Some(archive) = archive else {
            return Self {
                run,
                best: None,
                archive: Vec::new(),
                weights,
            };
        };

        let frontier = archive.frontier(&weights);
        let wins = ParetoArchive::win_counts(&frontier, &weights);
        let entries: Vec<ArchivedCandidate> = archive
            .entries()
            .iter()
            .map(|entry| {
                let position = frontier.iter().position(|f| f.id() == entry.id());
                ArchivedCandidate {
                    entry: entry.clone(),
                    on_frontier: position.is_some(),
                    win_count: position.map_or(0, |i| wins[i]),
                    mean_aggregate: entry.mean_aggregate(&weights),
                }
            })
            .collect();
        let best_id = archive.best(&weights).map(ArchiveEntry::id);
        let best = best_id.and_then(|id| entries.iter().find(|e| e.entry.id() == id).cloned());

        Self {
            run,
            best,
            archive: entries,
            weights,
        }
    }

    pub fn best_instruction(&self) -> Option<&str> {
        self.best.as_ref().map(|b| b.entry.candidate.instruction.as_str())
    }

    pub fn frontier(&self) -> impl Iterator<Item = &ArchivedCandidate> {
        self.archive.iter().filter(|c| c.on_frontier)
    }

    /// Flatten the outcome into records with stable identifiers.
    pub fn records(&self) -> RunRecords {
        let run_id = self.run.id;
        let candidates = self
            .archive
            .iter()
            .map(|c| {
                let candidate = &c.entry.candidate;
                CandidateRecord {
                    candidate_id: candidate.id,
                    run_id,
                    instruction: candidate.instruction.clone(),
                    generation: candidate.generation,
                    parent_ids: candidate.parent_ids.clone(),
                    origin: candidate.origin,
                    created_at: candidate.created_at,
                }
            })
            .collect();

        let scores = self
            .archive
            .iter()
            .flat_map(|c| {
                let candidate_id = c.entry.id();
                c.entry.scores.iter().flat_map(move |v| {
                    v.scores.iter().map(move |(dimension, score)| ScoreRecord {
                        candidate_id,
                        example_id: v.example_id.clone(),
                        dimension,
                        score,
                        failed: v.is_failed(),
                        feedback: v.feedback.clone(),
                    })
                })
            })
            .collect();

        let archive = self
            .archive
            .iter()
            .map(|c| ArchiveMembershipRecord {
                run_id,
                candidate_id: c.entry.id(),
                position: c.entry.seq,
                on_frontier: c.on_frontier,
                win_count: c.win_count,
                mean_aggregate: c.mean_aggregate,
            })
            .collect();

        RunRecords {
            run: RunRecord {
                run_id,
                name: self.run.name.clone(),
                status: self.run.status,
                iterations: self.run.iteration,
                evaluation_calls: self.run.evaluation_calls,
                best_score: self.run.best_score,
                best_candidate_id: self.best.as_ref().map(|b| b.entry.id()),
                failure_reason: self.run.failure_reason.clone(),
                created_at: self.run.created_at,
                finished_at: self.run.finished_at,
            },
            candidates,
            scores,
            archive,
        }
    }
}
