//! reldate-finder library interface
//!
//! Release-date aggregation engine: queries several unreliable sources per
//! game title, normalizes the dates they report and reconciles them into one
//! verdict with a confidence signal.

pub mod consensus;
pub mod error;
pub mod normalizer;
pub mod probes;
pub mod runner;
pub mod types;
pub mod workflow;

pub use crate::consensus::ConsensusReconciler;
pub use crate::error::{FinderError, FinderResult};
pub use crate::normalizer::{normalize_date, DateNormalizer, NormalizedDate};
pub use crate::runner::SourceRunner;
pub use crate::types::{
    Candidate, Confidence, SourceDescriptor, SourceEntry, SourceFailure, SourceProbe, SourceTable,
    Verdict,
};
pub use crate::workflow::{
    AggregationMode, BatchHandle, BatchOrchestrator, BatchReport, BatchSummary, EngineConfig,
    ProgressEvent,
};
