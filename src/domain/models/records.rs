//! Flat records for persisting a finished run.
//!
//! Each record carries stable identifiers only, so an external store can
//! lay them out as independent tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::candidate::CandidateOrigin;
use super::dimension::Dimension;
use super::run::RunStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub candidate_id: Uuid,
    pub run_id: Uuid,
    pub instruction: String,
    pub generation: u32,
    pub parent_ids: Vec<Uuid>,
    pub origin: CandidateOrigin,
    pub created_at: DateTime<Utc>,
}

/// One dimension score of one candidate on one validation example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub candidate_id: Uuid,
    pub example_id: String,
    pub dimension: Dimension,
    pub score: f64,
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMembershipRecord {
    pub run_id: Uuid,
    pub candidate_id: Uuid,
    /// Insertion order within the archive
    pub position: u64,
    pub on_frontier: bool,
    pub win_count: u32,
    pub mean_aggregate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub name: String,
    pub status: RunStatus,
    pub iterations: u64,
    pub evaluation_calls: u64,
    pub best_score: Option<f64>,
    pub best_candidate_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Everything needed to persist a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecords {
    pub run: RunRecord,
    pub candidates: Vec<CandidateRecord>,
    pub scores: Vec<ScoreRecord>,
    pub archive: Vec<ArchiveMembershipRecord>,
}
