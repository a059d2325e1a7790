//! prompt-evolve - evolutionary prompt optimization
//!
//! Improves a seed instruction for a language-model task by repeatedly
//! reflecting on its failures, proposing rewritten instructions, and keeping
//! the candidates that are best on at least one validation example in a
//! bounded Pareto archive. End-user feedback votes shift the weights of the
//! fitness dimensions while a run is in progress.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the `ModelClient` / `Metric` ports
//! - **Service Layer** (`services`): fitness, feedback mapping, evaluation, the
//!   Pareto archive, reflective mutation and the run controller
//! - **Adapters** (`adapters`): HTTP and scripted model clients, built-in metrics
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use prompt_evolve::{RunController, RunRequest, OptimizerConfig};
//!
//! let controller = RunController::new(OptimizerConfig::default(), task_model, reflection_model, metric);
//! let outcome = controller.run(request).await?;
//! println!("{:?}", outcome.best_instruction());
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainResult, OptimizerError};
pub use domain::models::{
    Candidate, Config, Dimension, DimensionScores, DimensionWeights, Example, FeedbackEvent, OptimizationRun,
    OptimizerConfig, ProgressEvent, RunRequest, RunStatus, VoteType,
};
pub use domain::ports::{Metric, MetricScore, ModelClient, ModelError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ParetoArchive, RunController, RunHandle, RunOutcome};
