//! Port trait definitions (Hexagonal Architecture)
//!
//! - ModelClient: text generation for the task and reflection models
//! - Metric: deterministic scoring of task outputs

pub mod metric;
pub mod model_client;

pub use metric::{Metric, MetricScore};
pub use model_client::{ModelClient, ModelError};
