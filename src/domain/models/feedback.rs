//! End-user feedback events and the weight deltas they map to.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::dimension::Dimension;

/// Polarity of a feedback vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    Up,
    Down,
    Critical,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "up" | "upvote" => Some(Self::Up),
            "down" | "downvote" => Some(Self::Down),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// What the feedback is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    #[default]
    Message,
    ToolUse,
    Memory,
    Reasoning,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::ToolUse => "tool_use",
            Self::Memory => "memory",
            Self::Reasoning => "reasoning",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "message" => Some(Self::Message),
            "tool_use" | "tool_call" | "tool" => Some(Self::ToolUse),
            "memory" => Some(Self::Memory),
            "reasoning" => Some(Self::Reasoning),
            _ => None,
        }
    }
}

/// Known reason tags carried by feedback votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonTag {
    GreatAnswer,
    Helpful,
    Perfect,
    WrongAnswer,
    TooSlow,
    TooVerbose,
    Inconsistent,
    SameApproach,
    NotInnovative,
    DoesntFitCase,
    MissingContext,
    WrongTool,
    WrongParams,
    Unnecessary,
    NotRelevant,
    Critical,
    Outdated,
    TooGeneric,
    IncorrectAssumption,
    MissedConsideration,
    Overcomplicated,
    WrongDirection,
}

impl ReasonTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GreatAnswer => "great_answer",
            Self::Helpful => "helpful",
            Self::Perfect => "perfect",
            Self::WrongAnswer => "wrong_answer",
            Self::TooSlow => "too_slow",
            Self::TooVerbose => "too_verbose",
            Self::Inconsistent => "inconsistent",
            Self::SameApproach => "same_approach",
            Self::NotInnovative => "not_innovative",
            Self::DoesntFitCase => "doesnt_fit_case",
            Self::MissingContext => "missing_context",
            Self::WrongTool => "wrong_tool",
            Self::WrongParams => "wrong_params",
            Self::Unnecessary => "unnecessary",
            Self::NotRelevant => "not_relevant",
            Self::Critical => "critical",
            Self::Outdated => "outdated",
            Self::TooGeneric => "too_generic",
            Self::IncorrectAssumption => "incorrect_assumption",
            Self::MissedConsideration => "missed_consideration",
            Self::Overcomplicated => "overcomplicated",
            Self::WrongDirection => "wrong_direction",
        }
    }

    /// Parse a tag name, accepting the legacy aliases `incorrect` and `wrong_context`.
    pub fn parse(s: &str) -> Option<Self> {
        let tag = match s.trim().to_lowercase().as_str() {
            "great_answer" => Self::GreatAnswer,
            "helpful" => Self::Helpful,
            "perfect" => Self::Perfect,
            "wrong_answer" | "incorrect" => Self::WrongAnswer,
            "too_slow" => Self::TooSlow,
            "too_verbose" => Self::TooVerbose,
            "inconsistent" => Self::Inconsistent,
            "same_approach" => Self::SameApproach,
            "not_innovative" => Self::NotInnovative,
            "doesnt_fit_case" => Self::DoesntFitCase,
            "missing_context" => Self::MissingContext,
            "wrong_tool" => Self::WrongTool,
            "wrong_params" => Self::WrongParams,
            "unnecessary" => Self::Unnecessary,
            "not_relevant" | "wrong_context" => Self::NotRelevant,
            "critical" => Self::Critical,
            "outdated" => Self::Outdated,
            "too_generic" => Self::TooGeneric,
            "incorrect_assumption" => Self::IncorrectAssumption,
            "missed_consideration" => Self::MissedConsideration,
            "overcomplicated" => Self::Overcomplicated,
            "wrong_direction" => Self::WrongDirection,
            _ => return None,
        };
        Some(tag)
    }
}

/// A single vote on one produced artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    #[serde(default)]
    pub target_type: TargetType,
    #[serde(default)]
    pub target_id: String,
    pub vote: VoteType,
    /// Free-form reason tag; unrecognized tags are a no-op
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FeedbackEvent {
    pub fn new(vote: VoteType, reason: Option<&str>) -> Self {
        Self {
            target_type: TargetType::Message,
            target_id: String::new(),
            vote,
            reason: reason.map(str::to_string),
        }
    }

    pub fn on_target(mut self, target_type: TargetType, target_id: impl Into<String>) -> Self {
        self.target_type = target_type;
        self.target_id = target_id.into();
        self
    }
}

/// Additive adjustments to dimension weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightDeltas(BTreeMap<Dimension, f64>);

impl WeightDeltas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, dimension: Dimension, delta: f64) -> Self {
        *self.0.entry(dimension).or_insert(0.0) += delta;
        self
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        self.0.get(&dimension).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        self.0.iter().map(|(d, v)| (*d, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop deltas on dimensions not in `active`.
    pub fn restricted_to(&self, active: &[Dimension]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(d, _)| active.contains(d))
                .map(|(d, v)| (*d, *v))
                .collect(),
        )
    }
}

impl FromIterator<(Dimension, f64)> for WeightDeltas {
    fn from_iter<T: IntoIterator<Item = (Dimension, f64)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::new(), |acc, (d, v)| acc.with(d, v))
    }
}
