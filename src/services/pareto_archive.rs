//! Pareto archive.
//!
//! Holds the retained candidates of a run together with their score vectors
//! on the fixed validation set. The archive answers three questions:
//!
//! 1. Which entries are non-dominated (the frontier), comparing per-example
//!    weighted aggregates.
//! 2. How often each frontier entry is the best on some validation example
//!    (win counts), which drives parent selection.
//! 3. Which entry to drop when the archive is full. Eviction uses NSGA-II
//!    crowding distance over per-dimension mean scores, and never removes an
//!    entry that holds the best mean on some dimension.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::fitness::dominates;
use crate::domain::errors::{DomainResult, OptimizerError};
use crate::domain::models::{Candidate, Dimension, DimensionScores, DimensionWeights, ScoreVector};

// ============================================================================
// Entries
// ============================================================================

/// A candidate and its scores on every validation example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub candidate: Candidate,
    /// One score vector per validation example, in validation order
    pub scores: Vec<ScoreVector>,
    /// Insertion sequence number; higher is newer
    pub seq: u64,
}

impl ArchiveEntry {
    pub fn id(&self) -> Uuid {
        self.candidate.id
    }

    /// Weighted aggregate per validation example; failed examples count as 0.0.
    pub fn example_aggregates(&self, weights: &DimensionWeights) -> Vec<f64> {
        self.scores.iter().map(|v| v.aggregate(weights)).collect()
    }

    pub fn mean_aggregate(&self, weights: &DimensionWeights) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.example_aggregates(weights).iter().sum::<f64>() / self.scores.len() as f64
    }

    /// Per-dimension mean over the validation set.
    pub fn dimension_means(&self) -> DimensionScores {
        DimensionScores::mean(self.scores.iter().map(|v| &v.scores))
    }
}

/// Why an insertion was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The newcomer had the lowest crowding distance among evictable entries
    LeastDiverse,
    /// Every entry, the newcomer included, is a per-dimension extremum
    AllProtected,
}

/// Result of [`ParetoArchive::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AddOutcome {
    Inserted,
    InsertedWithEviction { evicted: Uuid },
    Rejected { reason: RejectReason },
}

impl AddOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    pub fn evicted(&self) -> Option<Uuid> {
        match self {
            Self::InsertedWithEviction { evicted } => Some(*evicted),
            _ => None,
        }
    }
}

// ============================================================================
// Archive
// ============================================================================

/// Bounded archive of candidates scored on a fixed validation set.
#[derive(Debug, Clone)]
pub struct ParetoArchive {
    validation_ids: Vec<String>,
    max_size: usize,
    entries: Vec<ArchiveEntry>,
    next_seq: u64,
}

impl ParetoArchive {
    pub fn new(validation_ids: Vec<String>, max_size: usize) -> DomainResult<Self> {
        if validation_ids.is_empty() {
            return Err(OptimizerError::RunSetupInvalid(
                "validation set must not be empty".to_string(),
            ));
        }
        if max_size == 0 {
            return Err(OptimizerError::RunSetupInvalid(
                "archive max size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            validation_ids,
            max_size,
            entries: Vec::new(),
            next_seq: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn validation_ids(&self) -> &[String] {
        &self.validation_ids
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn get(&self, candidate_id: Uuid) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|e| e.id() == candidate_id)
    }

    pub fn contains(&self, candidate_id: Uuid) -> bool {
        self.get(candidate_id).is_some()
    }

    /// Insert a scored candidate, evicting if the archive is full.
    ///
    /// # Errors
    /// - `ValidationSetMismatch` - `scores` does not line up with the validation set
    /// - `DuplicateCandidate` - the candidate is already archived
    pub fn add(
        &mut self,
        candidate: Candidate,
        scores: Vec<ScoreVector>,
        weights: &DimensionWeights,
    ) -> DomainResult<AddOutcome> {
        self.check_scores(&scores)?;
        if self.contains(candidate.id) {
            return Err(OptimizerError::DuplicateCandidate(candidate.id));
        }

        let entry = ArchiveEntry {
            candidate,
            scores,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        if self.entries.len() < self.max_size {
            self.entries.push(entry);
            return Ok(AddOutcome::Inserted);
        }

        let mut pool: Vec<&ArchiveEntry> = self.entries.iter().collect();
        pool.push(&entry);
        let newcomer = pool.len() - 1;

        let points = objective_points(&pool);
        let crowding = crowding_distance(&points);
        let protected = extrema(&points);
        let means: Vec<f64> = pool.iter().map(|e| e.mean_aggregate(weights)).collect();

        let victim = (0..pool.len())
            .filter(|i| !protected[*i])
            .min_by(|a, b| {
                crowding[*a]
                    .total_cmp(&crowding[*b])
                    .then_with(|| means[*a].total_cmp(&means[*b]))
                    .then_with(|| pool[*b].seq.cmp(&pool[*a].seq))
            });

        match victim {
            None => {
                tracing::debug!(candidate_id = %entry.id(), "archive full of extrema, rejecting newcomer");
                Ok(AddOutcome::Rejected {
                    reason: RejectReason::AllProtected,
                })
            }
            Some(i) if i == newcomer => Ok(AddOutcome::Rejected {
                reason: RejectReason::LeastDiverse,
            }),
            Some(i) => {
                let evicted = self.entries.remove(i);
                tracing::debug!(
                    candidate_id = %entry.id(),
                    evicted = %evicted.id(),
                    crowding = crowding[i],
                    "evicted least diverse archive entry"
                );
                self.entries.push(entry);
                Ok(AddOutcome::InsertedWithEviction { evicted: evicted.id() })
            }
        }
    }

    fn check_scores(&self, scores: &[ScoreVector]) -> DomainResult<()> {
        if scores.len() != self.validation_ids.len() {
            return Err(OptimizerError::ValidationSetMismatch(format!(
                "expected {} score vectors, got {}",
                self.validation_ids.len(),
                scores.len()
            )));
        }
        if let Some((expected, got)) = self
            .validation_ids
            .iter()
            .zip(scores)
            .find(|(id, v)| **id != v.example_id)
        {
            return Err(OptimizerError::ValidationSetMismatch(format!(
                "expected example {expected}, got {}",
                got.example_id
            )));
        }
        Ok(())
    }

    /// Entries not dominated by any other entry, in insertion order.
    pub fn frontier(&self, weights: &DimensionWeights) -> Vec<&ArchiveEntry> {
        let aggregates: Vec<Vec<f64>> = self
            .entries
            .iter()
            .map(|e| e.example_aggregates(weights))
            .collect();
        self.entries
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                !aggregates
                    .iter()
                    .enumerate()
                    .any(|(j, other)| j != *i && dominates(other, &aggregates[*i]))
            })
            .map(|(_, e)| e)
            .collect()
    }

    /// Win counts aligned with `frontier`.
    ///
    /// For each validation example every entry tying the maximum aggregate
    /// gets one win, so every example contributes at least one.
    pub fn win_counts(frontier: &[&ArchiveEntry], weights: &DimensionWeights) -> Vec<u32> {
        let mut wins = vec![0u32; frontier.len()];
        if frontier.is_empty() {
            return wins;
        }
        let aggregates: Vec<Vec<f64>> = frontier.iter().map(|e| e.example_aggregates(weights)).collect();
        let examples = aggregates.iter().map(Vec::len).min().unwrap_or(0);
        for k in 0..examples {
            let best = aggregates
                .iter()
                .map(|a| a[k])
                .fold(f64::NEG_INFINITY, f64::max);
            for (i, a) in aggregates.iter().enumerate() {
                if a[k] == best {
                    wins[i] += 1;
                }
            }
        }
        wins
    }

    /// Sample a frontier entry with probability proportional to `wins + 1`.
    pub fn select_parent<R: Rng + ?Sized>(&self, weights: &DimensionWeights, rng: &mut R) -> Option<ArchiveEntry> {
        let frontier = self.frontier(weights);
        let wins = Self::win_counts(&frontier, weights);
        let dist = WeightedIndex::new(wins.iter().map(|w| w + 1)).ok()?;
        frontier.get(dist.sample(rng)).map(|e| (*e).clone())
    }

    /// Two distinct frontier entries, sampled like [`Self::select_parent`].
    pub fn select_pair<R: Rng + ?Sized>(
        &self,
        weights: &DimensionWeights,
        rng: &mut R,
    ) -> Option<(ArchiveEntry, ArchiveEntry)> {
        let frontier = self.frontier(weights);
        if frontier.len() < 2 {
            return None;
        }
        let mut wins: Vec<u32> = Self::win_counts(&frontier, weights).iter().map(|w| w + 1).collect();
        let first = WeightedIndex::new(&wins).ok()?.sample(rng);
        wins[first] = 0;
        let second = WeightedIndex::new(&wins).ok()?.sample(rng);
        Some((frontier[first].clone(), frontier[second].clone()))
    }

    /// Highest mean aggregate; the most recently inserted entry wins ties.
    pub fn best(&self, weights: &DimensionWeights) -> Option<&ArchiveEntry> {
        self.entries.iter().max_by(|a, b| {
            a.mean_aggregate(weights)
                .total_cmp(&b.mean_aggregate(weights))
                .then_with(|| a.seq.cmp(&b.seq))
        })
    }
}

// ============================================================================
// Crowding distance
// ============================================================================

fn objective_dimensions(pool: &[&ArchiveEntry]) -> Vec<Dimension> {
    let mut dims: Vec<Dimension> = pool
        .iter()
        .flat_map(|e| e.scores.iter().flat_map(|v| v.scores.dimensions()))
        .collect();
    dims.sort();
    dims.dedup();
    dims
}

/// Per-dimension mean score vectors, one row per entry.
fn objective_points(pool: &[&ArchiveEntry]) -> Vec<Vec<f64>> {
    let dims = objective_dimensions(pool);
    pool.iter()
        .map(|e| {
            let means = e.dimension_means();
            dims.iter().map(|d| means.get(*d).unwrap_or(0.0)).collect()
        })
        .collect()
}

/// NSGA-II crowding distance.
///
/// Boundary points on each objective get infinite distance; interior points
/// accumulate the normalized gap between their neighbours. Objectives with
/// zero range contribute nothing.
pub fn crowding_distance(points: &[Vec<f64>]) -> Vec<f64> {
    let n = points.len();
    let mut distance = vec![0.0; n];
    if n == 0 {
        return distance;
    }
    let objectives = points.iter().map(Vec::len).min().unwrap_or(0);
    let mut order: Vec<usize> = (0..n).collect();

    for m in 0..objectives {
        order.sort_by(|a, b| points[*a][m].partial_cmp(&points[*b][m]).unwrap_or(Ordering::Equal));
        let min = points[order[0]][m];
        let max = points[order[n - 1]][m];
        let range = max - min;
        if range <= 0.0 {
            continue;
        }
        distance[order[0]] = f64::INFINITY;
        distance[order[n - 1]] = f64::INFINITY;
        for k in 1..n.saturating_sub(1) {
            distance[order[k]] += (points[order[k + 1]][m] - points[order[k - 1]][m]) / range;
        }
    }
    distance
}

/// Entries holding the maximum on some objective with non-zero range.
fn extrema(points: &[Vec<f64>]) -> Vec<bool> {
    let mut protected = vec![false; points.len()];
    let objectives = points.iter().map(Vec::len).min().unwrap_or(0);
    for m in 0..objectives {
        let max = points.iter().map(|p| p[m]).fold(f64::NEG_INFINITY, f64::max);
        let min = points.iter().map(|p| p[m]).fold(f64::INFINITY, f64::min);
        if max <= min {
            continue;
        }
        for (i, p) in points.iter().enumerate() {
            if p[m] == max {
                protected[i] = true;
            }
        }
    }
    protected
}
