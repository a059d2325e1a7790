//! Optimization run domain model.
//!
//! A run moves `pending -> running -> {completed, failed, cancelled}`.
//! Terminal states are final.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dimension::DimensionScores;
use super::evaluation::Example;
use crate::domain::errors::{DomainResult, OptimizerError};

/// Lifecycle status of an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn valid_transitions(&self) -> Vec<RunStatus> {
        match self {
            Self::Pending => vec![Self::Running, Self::Failed, Self::Cancelled],
            Self::Running => vec![Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs for one optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub name: String,
    pub seed_instruction: String,
    /// Examples minibatches are drawn from
    pub feedback_pool: Vec<Example>,
    /// Fixed examples every archive entry is scored on
    pub validation_set: Vec<Example>,
}

/// Bookkeeping for one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRun {
    pub id: Uuid,
    pub name: String,
    pub status: RunStatus,
    /// Completed iterations
    pub iteration: u64,
    /// Task-model calls made so far
    pub evaluation_calls: u64,
    /// Best mean aggregate seen on the validation set
    pub best_score: Option<f64>,
    pub weights_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl OptimizationRun {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: RunStatus::Pending,
            iteration: 0,
            evaluation_calls: 0,
            best_score: None,
            weights_version: 0,
            failure_reason: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to `new_status`, stamping start/finish times.
    pub fn transition_to(&mut self, new_status: RunStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(OptimizerError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }
        self.status = new_status;
        match new_status {
            RunStatus::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.finished_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// Record a setup failure and move to `failed`.
    pub fn fail(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        self.failure_reason = Some(reason.into());
        self.transition_to(RunStatus::Failed)
    }

    /// Raise `best_score` if `score` beats it.
    pub fn observe_score(&mut self, score: f64) {
        if self.best_score.map_or(true, |best| score > best) {
            self.best_score = Some(score);
        }
    }
}

/// What a progress event reports on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressDetail {
    Started,
    /// The child beat its parent on the minibatch
    Accepted {
        candidate_id: Uuid,
        archived: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        evicted: Option<Uuid>,
    },
    /// The child did not clear the acceptance gate
    Rejected {
        candidate_id: Uuid,
        parent_mean: f64,
        child_mean: Option<f64>,
    },
    /// The iteration stopped early (model failure, bad mutation)
    Aborted { reason: String },
    Finished { reason: String },
}

/// One entry in a run's progress feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: Uuid,
    pub iteration: u64,
    pub best_score: Option<f64>,
    /// Per-dimension mean validation scores of the current best entry
    pub current_dimension_scores: DimensionScores,
    pub status: RunStatus,
    pub detail: ProgressDetail,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            assert!(terminal.is_terminal());
            assert!(terminal.valid_transitions().is_empty());
        }
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Pending));
    }

    #[test]
    fn test_transition_stamps_times() {
        let mut run = OptimizationRun::new("demo");
        run.transition_to(RunStatus::Running).unwrap();
        assert!(run.started_at.is_some());
        run.transition_to(RunStatus::Completed).unwrap();
        assert!(run.finished_at.is_some());

        let err = run.transition_to(RunStatus::Running).unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_observe_score_keeps_maximum() {
        let mut run = OptimizationRun::new("demo");
        run.observe_score(0.4);
        run.observe_score(0.2);
        run.observe_score(0.7);
        assert_eq!(run.best_score, Some(0.7));
    }
}
