//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::feedback::FeedbackArgs;
use super::commands::run::RunArgs;

#[derive(Parser, Debug)]
#[command(name = "prompt-evolve")]
#[command(about = "Evolve instruction prompts with a Pareto archive and reflective mutation", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file; defaults to .prompt-evolve/config.yaml
    #[arg(short, long, global = true, env = "PROMPT_EVOLVE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an optimization over a dataset
    Run(RunArgs),

    /// Map a feedback vote to dimension weight adjustments
    Feedback(FeedbackArgs),
}
