//! Candidate domain model.
//!
//! A candidate is one immutable instruction string together with its lineage.
//! Mutation never edits a candidate; it produces a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a candidate came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    /// The instruction the run started from
    Seed,
    /// Reflective rewrite of a single parent
    Mutation,
    /// Combination of two frontier candidates
    Merge,
}

impl CandidateOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Mutation => "mutation",
            Self::Merge => "merge",
        }
    }
}

/// A prompt instruction under evolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Uuid,
    pub instruction: String,
    /// 0 for the seed, `max(parent generations) + 1` otherwise
    pub generation: u32,
    /// Ordered parent ids; empty for the seed
    pub parent_ids: Vec<Uuid>,
    pub origin: CandidateOrigin,
    pub created_at: DateTime<Utc>,
}

impl Candidate {
    pub fn seed(instruction: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            instruction: instruction.into(),
            generation: 0,
            parent_ids: Vec::new(),
            origin: CandidateOrigin::Seed,
            created_at: Utc::now(),
        }
    }

    pub fn mutation_of(parent: &Candidate, instruction: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            instruction: instruction.into(),
            generation: parent.generation + 1,
            parent_ids: vec![parent.id],
            origin: CandidateOrigin::Mutation,
            created_at: Utc::now(),
        }
    }

    pub fn merge_of(first: &Candidate, second: &Candidate, instruction: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            instruction: instruction.into(),
            generation: first.generation.max(second.generation) + 1,
            parent_ids: vec![first.id, second.id],
            origin: CandidateOrigin::Merge,
            created_at: Utc::now(),
        }
    }

    pub fn is_seed(&self) -> bool {
        self.parent_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lineage_tracks_generation_and_parents() {
        let seed = Candidate::seed("Answer concisely.");
        assert!(seed.is_seed());
        assert_eq!(seed.generation, 0);

        let child = Candidate::mutation_of(&seed, "Answer concisely and cite sources.");
        assert_eq!(child.generation, 1);
        assert_eq!(child.parent_ids, vec![seed.id]);
        assert_ne!(child.id, seed.id);

        let grandchild = Candidate::mutation_of(&child, "Answer in one sentence.");
        let merged = Candidate::merge_of(&seed, &grandchild, "Combined.");
        assert_eq!(merged.generation, 3);
        assert_eq!(merged.parent_ids, vec![seed.id, grandchild.id]);
        assert_eq!(merged.origin, CandidateOrigin::Merge);
    }
}
