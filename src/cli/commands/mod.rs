//! CLI command implementations.

pub mod feedback;
pub mod run;
