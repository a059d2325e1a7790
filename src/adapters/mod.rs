//! Adapters layer
//!
//! Implementations of the domain ports:
//! - `llm`: model clients (OpenAI-compatible HTTP, scripted)
//! - `metrics`: built-in scoring metrics

pub mod llm;
pub mod metrics;
