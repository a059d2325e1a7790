//! `run` command: optimize a seed instruction over a dataset.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::adapters::llm::OpenAiCompatibleClient;
use crate::adapters::metrics::ReferenceMetric;
use crate::cli::output::{create_iteration_bar, output, truncate, CommandOutput, ProgressBarExt, TableFormatter};
use crate::domain::models::{
    Config, Dimension, DimensionWeights, OptimizationRun, OptimizerConfig, ProgressDetail, RunRequest, RunStatus,
};
use crate::domain::ports::ModelClient;
use crate::services::{ArchivedCandidate, RunController, RunOutcome};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Dataset JSON with seed_instruction, feedback_pool and validation_set
    #[arg(short, long)]
    pub dataset: PathBuf,

    /// Run name; defaults to the dataset file name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Override the iteration budget
    #[arg(short, long)]
    pub iterations: Option<u64>,

    /// Override the task-model call budget
    #[arg(long)]
    pub max_evaluation_calls: Option<u64>,

    /// Seed for reproducible sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write flat run records as JSON to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run: OptimizationRun,
    pub best_instruction: Option<String>,
    pub weights: DimensionWeights,
    pub frontier: Vec<ArchivedCandidate>,
    pub archive_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_path: Option<PathBuf>,
    #[serde(skip)]
    archive: Vec<ArchivedCandidate>,
}

impl RunSummary {
    fn from_outcome(outcome: RunOutcome, records_path: Option<PathBuf>) -> Self {
        Self {
            best_instruction: outcome.best_instruction().map(str::to_string),
            frontier: outcome.frontier().cloned().collect(),
            archive_size: outcome.archive.len(),
            run: outcome.run,
            weights: outcome.weights,
            records_path,
            archive: outcome.archive,
        }
    }

    fn dimensions(&self) -> Vec<Dimension> {
        self.weights.dimensions()
    }
}

impl CommandOutput for RunSummary {
    fn to_human(&self) -> String {
        let run = &self.run;
        let mut lines = vec![
            format!("Run: {} ({})", run.name, run.id),
            format!("Status: {}", run.status),
            format!("Iterations: {}", run.iteration),
            format!("Evaluation calls: {}", run.evaluation_calls),
            format!(
                "Best validation score: {}",
                run.best_score.map_or_else(|| "-".to_string(), |s| format!("{s:.4}"))
            ),
        ];
        if let Some(reason) = &run.failure_reason {
            lines.push(format!("Failure: {reason}"));
        }

        if !self.archive.is_empty() {
            lines.push(format!(
                "\nArchive ({} entries, {} on the frontier):",
                self.archive_size,
                self.frontier.len()
            ));
            lines.push(TableFormatter::new().format_archive(&self.archive, &self.dimensions()));
        }

        if let Some(best) = &self.best_instruction {
            lines.push(format!("\nBest instruction:\n{best}"));
        }
        if let Some(path) = &self.records_path {
            lines.push(format!("\nRecords written to {}", path.display()));
        }

        lines.join("\n")
    }
}

pub async fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<()> {
    let mut request = load_dataset(&args.dataset).await?;
    if let Some(name) = &args.name {
        request.name.clone_from(name);
    }

    let optimizer = apply_overrides(config.optimizer.clone(), &args);
    let task_model: Arc<dyn ModelClient> = Arc::new(
        OpenAiCompatibleClient::from_config(&config.task_model).context("Failed to create task model client")?,
    );
    let reflection_model: Arc<dyn ModelClient> = Arc::new(
        OpenAiCompatibleClient::from_config(&config.reflection_model)
            .context("Failed to create reflection model client")?,
    );

    let mut controller = RunController::new(
        optimizer.clone(),
        task_model,
        reflection_model,
        Arc::new(ReferenceMetric::new()),
    );
    if let Some(weights) = config.weights.clone() {
        controller = controller.with_weights(weights);
    }

    let mut handle = controller.start(request);
    tracing::info!(run_id = %handle.run_id(), "optimization started");

    let bar = create_iteration_bar(optimizer.max_iterations, !json_mode && !args.no_progress);
    let progress = handle.take_events().map(|mut events| {
        let bar = bar.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        bar.apply_event(&event);
                        if matches!(event.detail, ProgressDetail::Finished { .. }) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "progress feed lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let cancel = handle.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let outcome = handle.wait().await.context("Optimization run did not complete")?;
    interrupt.abort();
    if let Some(progress) = progress {
        let _ = progress.await;
    }

    match outcome.run.status {
        RunStatus::Completed => bar.finish_success("completed"),
        RunStatus::Cancelled => bar.finish_warning("cancelled"),
        _ => bar.finish_error("failed"),
    }

    let records_path = match &args.output {
        Some(path) => {
            write_records(path, &outcome).await?;
            Some(path.clone())
        }
        None => None,
    };

    let failed = outcome.run.status == RunStatus::Failed;
    let reason = outcome.run.failure_reason.clone();
    output(&RunSummary::from_outcome(outcome, records_path), json_mode);

    if failed {
        bail!(
            "Optimization run failed: {}",
            reason.unwrap_or_else(|| "unknown reason".to_string())
        );
    }
    Ok(())
}

fn apply_overrides(mut optimizer: OptimizerConfig, args: &RunArgs) -> OptimizerConfig {
    if let Some(iterations) = args.iterations {
        optimizer.max_iterations = iterations;
    }
    if let Some(calls) = args.max_evaluation_calls {
        optimizer.max_evaluation_calls = Some(calls);
    }
    if let Some(seed) = args.seed {
        optimizer.seed = Some(seed);
    }
    optimizer
}

/// Read a `RunRequest` from JSON, naming it after the file when unnamed.
async fn load_dataset(path: &Path) -> Result<RunRequest> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    let mut request: RunRequest = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse dataset {}", path.display()))?;
    if request.name.trim().is_empty() {
        request.name = path
            .file_stem()
            .map_or_else(|| "run".to_string(), |s| s.to_string_lossy().into_owned());
    }
    tracing::debug!(
        name = %request.name,
        pool = request.feedback_pool.len(),
        validation = request.validation_set.len(),
        seed = %truncate(&request.seed_instruction, 40),
        "dataset loaded"
    );
    Ok(request)
}

async fn write_records(path: &Path, outcome: &RunOutcome) -> Result<()> {
    let body = serde_json::to_string_pretty(&outcome.records()).context("Failed to serialize run records")?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("Failed to write records to {}", path.display()))
}
