//! Domain errors for the prompt optimizer.

use thiserror::Error;
use uuid::Uuid;

use super::models::Dimension;
use super::ports::ModelError;

fn format_dimensions(dims: &[Dimension]) -> String {
    dims.iter()
        .map(|d| d.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Domain-level errors raised by the optimizer.
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("Dimension mismatch: expected [{}], got [{}]", format_dimensions(.expected), format_dimensions(.actual))]
    DimensionMismatch {
        expected: Vec<Dimension>,
        actual: Vec<Dimension>,
    },

    #[error("Unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("Evaluation failed for example {example_id}: {reason}")]
    EvaluationFailed { example_id: String, reason: String },

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Reflection model returned an unusable instruction: {0}")]
    InvalidMutation(String),

    #[error("Run setup invalid: {0}")]
    RunSetupInvalid(String),

    #[error("Score vectors do not match the validation set: {0}")]
    ValidationSetMismatch(String),

    #[error("Candidate already archived: {0}")]
    DuplicateCandidate(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Budget exhausted: {0}")]
    BudgetExhausted(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DomainResult<T> = Result<T, OptimizerError>;

impl From<ModelError> for OptimizerError {
    fn from(err: ModelError) -> Self {
        OptimizerError::ModelUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for OptimizerError {
    fn from(err: serde_json::Error) -> Self {
        OptimizerError::Internal(format!("serialization: {err}"))
    }
}
