//! Domain layer for the prompt optimizer
//!
//! This module contains the core data model and the port traits that
//! adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainResult, OptimizerError};
