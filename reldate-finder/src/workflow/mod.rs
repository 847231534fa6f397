//! Batch workflow: progress events, batch results and the orchestrator
//!
//! # Event ordering
//! - Per item: `ItemStarted` precedes the item's terminal event
//!   (`ItemCompleted` or `ItemFailed`).
//! - Per batch: `BatchCompleted` is the last event and follows every item's
//!   terminal event.
//!
//! Events are pushed as they occur, not collected until the batch ends.

pub mod orchestrator;

use crate::types::Verdict;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use orchestrator::{AggregationMode, BatchHandle, BatchOrchestrator, EngineConfig};

/// Batch progress event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    /// Item's group began processing
    ItemStarted {
        /// Batch identifier
        batch_id: Uuid,
        /// Position in the submitted list (0-based)
        index: usize,
        /// Title as submitted
        item: String,
    },

    /// Item resolved to a date or to "no result"
    ItemCompleted {
        /// Batch identifier
        batch_id: Uuid,
        /// Position in the submitted list (0-based)
        index: usize,
        /// Title as submitted
        item: String,
        /// Final answer
        verdict: Verdict,
    },

    /// Item could not be processed
    ItemFailed {
        /// Batch identifier
        batch_id: Uuid,
        /// Position in the submitted list (0-based)
        index: usize,
        /// Title as submitted
        item: String,
        /// Failure reason
        reason: String,
    },

    /// Every item reached a terminal state
    BatchCompleted {
        /// Batch identifier
        batch_id: Uuid,
        /// Outcome counts
        summary: BatchSummary,
    },
}

impl ProgressEvent {
    /// Item index, for per-item events
    pub fn index(&self) -> Option<usize> {
        match self {
            ProgressEvent::ItemStarted { index, .. }
            | ProgressEvent::ItemCompleted { index, .. }
            | ProgressEvent::ItemFailed { index, .. } => Some(*index),
            ProgressEvent::BatchCompleted { .. } => None,
        }
    }

    /// Whether this event ends an item
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::ItemCompleted { .. } | ProgressEvent::ItemFailed { .. }
        )
    }
}

/// Outcome counts for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Items submitted
    pub total: usize,
    /// Items with a date
    pub found: usize,
    /// Items where no source had a date
    pub no_result: usize,
    /// Items that failed
    pub failed: usize,
}

impl BatchSummary {
    /// Count one verdict
    pub fn record(&mut self, verdict: &Verdict) {
        self.total += 1;
        match verdict {
            Verdict::Found { .. } => self.found += 1,
            Verdict::NoResultFound => self.no_result += 1,
            Verdict::Error(_) => self.failed += 1,
        }
    }
}

/// Final result of a batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Batch identifier
    pub batch_id: Uuid,
    /// One verdict per item, in submission order
    pub verdicts: Vec<(String, Verdict)>,
    /// Outcome counts
    pub summary: BatchSummary,
}
