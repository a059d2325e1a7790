//! Run budget tracker.
//!
//! Tracks the two budgets an optimization run is bounded by: iterations and
//! task-model evaluation calls. Workers claim an iteration before starting
//! it and reserve evaluation calls before every evaluation; both operations
//! are lock-free so the accounting never serializes workers.
//!
//! Once any reservation fails the tracker is marked exhausted, which every
//! worker observes before claiming its next iteration.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::domain::models::OptimizerConfig;

// ============================================================================
// Supporting types
// ============================================================================

/// Point-in-time view of budget consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetState {
    pub iterations_claimed: u64,
    pub max_iterations: u64,
    pub evaluation_calls: u64,
    pub max_evaluation_calls: Option<u64>,
    pub exhausted: bool,
}

/// Which budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetKind {
    Iterations,
    EvaluationCalls,
}

impl BudgetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iterations => "iteration budget exhausted",
            Self::EvaluationCalls => "evaluation-call budget exhausted",
        }
    }
}

// ============================================================================
// BudgetTracker
// ============================================================================

#[derive(Debug)]
pub struct BudgetTracker {
    max_iterations: u64,
    max_evaluation_calls: Option<u64>,
    iterations_claimed: AtomicU64,
    evaluation_calls: AtomicU64,
    exhausted: AtomicBool,
}

impl BudgetTracker {
    pub fn new(max_iterations: u64, max_evaluation_calls: Option<u64>) -> Self {
        Self {
            max_iterations,
            max_evaluation_calls,
            iterations_claimed: AtomicU64::new(0),
            evaluation_calls: AtomicU64::new(0),
            exhausted: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self::new(config.max_iterations, config.max_evaluation_calls)
    }

    /// Claim the next iteration slot, returning its 1-based ordinal.
    ///
    /// Fails once the iteration budget is spent or any budget was exhausted.
    pub fn claim_iteration(&self) -> Result<u64, BudgetKind> {
        if self.exhausted.load(Ordering::Acquire) {
            return Err(BudgetKind::EvaluationCalls);
        }
        let max = self.max_iterations;
        self.iterations_claimed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .map(|previous| previous + 1)
            .map_err(|_| BudgetKind::Iterations)
    }

    /// Reserve `calls` evaluation calls, all or nothing.
    pub fn reserve_evaluations(&self, calls: u64) -> Result<(), BudgetKind> {
        let Some(max) = self.max_evaluation_calls else {
            self.evaluation_calls.fetch_add(calls, Ordering::AcqRel);
            return Ok(());
        };
        let reserved = self
            .evaluation_calls
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(calls).filter(|total| *total <= max)
            });
        if reserved.is_err() {
            self.exhausted.store(true, Ordering::Release);
            tracing::info!(requested = calls, max, "evaluation-call budget exhausted");
            return Err(BudgetKind::EvaluationCalls);
        }
        Ok(())
    }

    pub fn evaluation_calls(&self) -> u64 {
        self.evaluation_calls.load(Ordering::Acquire)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    pub fn state(&self) -> BudgetState {
        BudgetState {
            iterations_claimed: self.iterations_claimed.load(Ordering::Acquire),
            max_iterations: self.max_iterations,
            evaluation_calls: self.evaluation_calls(),
            max_evaluation_calls: self.max_evaluation_calls,
            exhausted: self.is_exhausted(),
        }
    }
}
