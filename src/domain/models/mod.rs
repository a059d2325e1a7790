pub mod candidate;
pub mod config;
pub mod dimension;
pub mod evaluation;
pub mod feedback;
pub mod records;
pub mod run;

pub use candidate::{Candidate, CandidateOrigin};
pub use config::{Config, LoggingConfig, ModelEndpointConfig, OptimizerConfig};
pub use dimension::{Dimension, DimensionScores, DimensionWeights, WEIGHT_SUM_TOLERANCE};
pub use evaluation::{EvaluationBatch, EvaluationStatus, Example, ExecutionTrace, ScoreVector};
pub use feedback::{FeedbackEvent, ReasonTag, TargetType, VoteType, WeightDeltas};
pub use records::{ArchiveMembershipRecord, CandidateRecord, RunRecord, RunRecords, ScoreRecord};
pub use run::{OptimizationRun, ProgressDetail, ProgressEvent, RunRequest, RunStatus};
