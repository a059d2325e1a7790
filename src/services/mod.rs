//! Optimizer services: fitness, feedback mapping, evaluation, the Pareto
//! archive, reflective mutation, and the run controller that ties them together.

pub mod budget_tracker;
pub mod evaluator;
pub mod feedback_mapper;
pub mod fitness;
pub mod pareto_archive;
pub mod reflective_mutator;
pub mod run_controller;

pub use budget_tracker::{BudgetKind, BudgetState, BudgetTracker};
pub use evaluator::Evaluator;
pub use feedback_mapper::{
    aggregate_feedback, apply_adjustment, map_feedback, normalize, FeedbackOutcome, SharedWeights, WeightsSnapshot,
};
pub use fitness::{compare, weighted_score, Dominance};
pub use pareto_archive::{crowding_distance, AddOutcome, ArchiveEntry, ParetoArchive, RejectReason};
pub use reflective_mutator::ReflectiveMutator;
pub use run_controller::{ArchivedCandidate, RunController, RunHandle, RunOutcome};
