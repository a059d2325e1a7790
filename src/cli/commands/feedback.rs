//! `feedback` command: show how votes shift the dimension weights.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{Config, DimensionWeights, FeedbackEvent, ReasonTag, TargetType, VoteType};
use crate::services::feedback_mapper::{aggregate_feedback, map_feedback, FeedbackOutcome, SharedWeights};

#[derive(Args, Debug)]
pub struct FeedbackArgs {
    /// Vote: up, down or critical
    #[arg(long, required_unless_present = "events")]
    pub vote: Option<String>,

    /// Reason tag, e.g. too_verbose or wrong_answer
    #[arg(long)]
    pub reason: Option<String>,

    /// What the vote is about: message, tool_use, memory or reasoning
    #[arg(long, default_value = "message")]
    pub target_type: String,

    /// Identifier of the voted-on artifact
    #[arg(long)]
    pub target_id: Option<String>,

    /// Starting weights (YAML or JSON map of dimension to weight)
    #[arg(long)]
    pub weights: Option<PathBuf>,

    /// JSON array of feedback events; their deltas are averaged
    #[arg(long, conflicts_with_all = ["vote", "reason"])]
    pub events: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackSummary {
    pub events: usize,
    pub before: DimensionWeights,
    #[serde(flatten)]
    pub outcome: FeedbackOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored_reason: Option<String>,
}

impl CommandOutput for FeedbackSummary {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if let Some(reason) = &self.ignored_reason {
            lines.push(format!("Unknown reason tag '{reason}'; weights unchanged."));
        } else if self.outcome.deltas.is_empty() {
            lines.push("No adjustment applies to these dimensions; weights unchanged.".to_string());
        } else {
            lines.push(format!(
                "Applied {} feedback event(s); weights version {}.",
                self.events, self.outcome.version
            ));
        }
        lines.push(TableFormatter::new().format_weights(&self.outcome.weights, Some(&self.outcome.deltas)));
        lines.join("\n")
    }
}

pub async fn execute(args: FeedbackArgs, config: &Config, json_mode: bool) -> Result<()> {
    let before = match &args.weights {
        Some(path) => load_weights(path).await?,
        None => config.weights.clone().unwrap_or_else(DimensionWeights::defaults),
    };

    let (events, ignored_reason) = match &args.events {
        Some(path) => (load_events(path).await?, None),
        None => {
            let event = build_event(&args)?;
            let ignored = event
                .reason
                .as_deref()
                .filter(|r| ReasonTag::parse(r).is_none())
                .map(str::to_string);
            (vec![event], ignored)
        }
    };

    let deltas = match events.as_slice() {
        [single] => map_feedback(single),
        many => aggregate_feedback(many),
    };

    let live = SharedWeights::new(before.clone());
    let outcome = live.apply_deltas(&deltas).await;

    output(
        &FeedbackSummary {
            events: events.len(),
            before,
            outcome,
            ignored_reason,
        },
        json_mode,
    );
    Ok(())
}

fn build_event(args: &FeedbackArgs) -> Result<FeedbackEvent> {
    let vote_raw = args.vote.as_deref().ok_or_else(|| anyhow!("--vote is required"))?;
    let vote = VoteType::from_str(vote_raw)
        .ok_or_else(|| anyhow!("Invalid vote '{vote_raw}'. Must be one of: up, down, critical"))?;
    let target = TargetType::from_str(&args.target_type).ok_or_else(|| {
        anyhow!(
            "Invalid target type '{}'. Must be one of: message, tool_use, memory, reasoning",
            args.target_type
        )
    })?;
    Ok(FeedbackEvent::new(vote, args.reason.as_deref())
        .on_target(target, args.target_id.clone().unwrap_or_default()))
}

async fn load_weights(path: &Path) -> Result<DimensionWeights> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read weights {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("Invalid weights in {}", path.display()))
}

async fn load_events(path: &Path) -> Result<Vec<FeedbackEvent>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read events {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid feedback events in {}", path.display()))
}
