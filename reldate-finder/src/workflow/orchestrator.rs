//! Batch Orchestrator
//!
//! Top-level engine: schedules items in fixed-size concurrent groups, runs
//! every configured source per item (consensus) or sources in priority order
//! until one yields a date (first-hit), reconciles candidates and streams
//! progress events to the caller.
//!
//! # Concurrency
//! - At most `item_concurrency` items run at once. A group finishes completely
//!   before the next group starts.
//! - Consensus mode runs at most `source_concurrency` sources per item at once.
//! - The source table is shared read-only; the event channel is the only
//!   shared sink and serializes writes.
//!
//! # Failure isolation
//! Source failures stay inside [`SourceRunner`]. A panic anywhere else in an
//! item's processing is caught at the item boundary and reported as
//! `ItemFailed`; sibling items and the batch carry on.

use super::{BatchReport, BatchSummary, ProgressEvent};
use crate::consensus::ConsensusReconciler;
use crate::error::{FinderError, FinderResult};
use crate::runner::{panic_message, SourceRunner};
use crate::types::{Candidate, SourceTable, Verdict};
use futures::future::join_all;
use futures::stream::{self, Stream, StreamExt};
use futures::FutureExt;
use reldate_common::config::{EngineSection, DEFAULT_ITEM_CONCURRENCY, DEFAULT_MAX_BATCH_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Failure reason for items skipped or stopped by cancellation
const CANCELLED: &str = "cancelled";

/// Failure reason for whitespace-only titles
const EMPTY_TITLE: &str = "empty title";

// ============================================================================
// Configuration
// ============================================================================

/// How sources are combined for one item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationMode {
    /// Query every source concurrently and vote
    #[default]
    Consensus,
    /// Query sources in priority order; accept the first date
    FirstHit,
}

impl FromStr for AggregationMode {
    type Err = FinderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "consensus" | "a" => Ok(AggregationMode::Consensus),
            "first-hit" | "firsthit" | "b" => Ok(AggregationMode::FirstHit),
            other => Err(FinderError::InvalidConfig(format!(
                "unknown mode '{}' (expected 'consensus' or 'first-hit')",
                other
            ))),
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationMode::Consensus => write!(f, "consensus"),
            AggregationMode::FirstHit => write!(f, "first-hit"),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Source aggregation policy
    pub mode: AggregationMode,
    /// Items per concurrent group (G)
    pub item_concurrency: usize,
    /// Concurrent sources per item in consensus mode (S)
    pub source_concurrency: usize,
    /// Upper bound for one probe step
    pub step_timeout: Duration,
    /// Batch size the engine is exercised with; larger batches only warn
    pub max_batch_size: usize,
    /// Capacity of the progress event channel used by [`BatchOrchestrator::submit_batch`]
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: AggregationMode::Consensus,
            item_concurrency: DEFAULT_ITEM_CONCURRENCY,
            source_concurrency: 3,
            step_timeout: Duration::from_secs(15),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            event_buffer: 64,
        }
    }
}

impl EngineConfig {
    /// Build from the TOML engine section
    pub fn from_section(section: &EngineSection) -> FinderResult<Self> {
        let config = Self {
            mode: section.mode.parse()?,
            item_concurrency: section.item_concurrency,
            source_concurrency: section.source_concurrency,
            step_timeout: Duration::from_millis(section.step_timeout_ms),
            max_batch_size: section.max_batch_size,
            event_buffer: section.event_buffer,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> FinderResult<()> {
        let invalid = |msg: &str| Err(FinderError::InvalidConfig(msg.to_string()));

        if self.item_concurrency == 0 {
            return invalid("item_concurrency must be at least 1");
        }
        if self.source_concurrency == 0 {
            return invalid("source_concurrency must be at least 1");
        }
        if self.step_timeout.is_zero() {
            return invalid("step timeout must be greater than zero");
        }
        if self.max_batch_size == 0 {
            return invalid("max_batch_size must be at least 1");
        }
        if self.event_buffer == 0 {
            return invalid("event_buffer must be at least 1");
        }
        Ok(())
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Batch aggregation engine
pub struct BatchOrchestrator {
    table: SourceTable,
    runner: SourceRunner,
    reconciler: ConsensusReconciler,
    config: EngineConfig,
}

impl BatchOrchestrator {
    /// Create the engine
    ///
    /// # Errors
    /// [`FinderError::InvalidConfig`] when `config` fails validation.
    pub fn new(table: SourceTable, config: EngineConfig) -> FinderResult<Self> {
        config.validate()?;

        info!(
            mode = %config.mode,
            sources = ?table.names(),
            item_concurrency = config.item_concurrency,
            source_concurrency = config.source_concurrency,
            step_timeout_ms = config.step_timeout.as_millis() as u64,
            "Aggregation engine initialized"
        );

        Ok(Self {
            runner: SourceRunner::new(config.step_timeout),
            reconciler: ConsensusReconciler::new(&table),
            table,
            config,
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Source table
    pub fn sources(&self) -> &SourceTable {
        &self.table
    }

    /// Run a batch to completion, pushing progress events to `events`
    ///
    /// A closed event channel is not an error: events are dropped and the
    /// batch still completes.
    pub async fn run_batch(
        &self,
        items: Vec<String>,
        events: &mpsc::Sender<ProgressEvent>,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let batch_id = Uuid::new_v4();
        let total = items.len();

        info!(
            batch_id = %batch_id,
            items = total,
            mode = %self.config.mode,
            "Batch started"
        );

        if total > self.config.max_batch_size {
            warn!(
                batch_id = %batch_id,
                items = total,
                max_batch_size = self.config.max_batch_size,
                "Batch exceeds configured maximum; larger batches are untested"
            );
        }

        let mut verdicts: Vec<Option<Verdict>> = vec![None; total];
        let indexed: Vec<(usize, &str)> = items.iter().map(String::as_str).enumerate().collect();

        for (group_number, group) in indexed.chunks(self.config.item_concurrency).enumerate() {
            if cancel.is_cancelled() {
                for &(index, item) in group {
                    emit_event(events, ProgressEvent::ItemStarted {
                        batch_id,
                        index,
                        item: item.to_string(),
                    })
                    .await;
                    let verdict = Verdict::Error(CANCELLED.to_string());
                    self.emit_terminal(events, batch_id, index, item, &verdict).await;
                    verdicts[index] = Some(verdict);
                }
                continue;
            }

            debug!(batch_id = %batch_id, group = group_number, size = group.len(), "Group started");

            for &(index, item) in group {
                emit_event(events, ProgressEvent::ItemStarted {
                    batch_id,
                    index,
                    item: item.to_string(),
                })
                .await;
            }

            let finished = join_all(group.iter().map(|&(index, item)| async move {
                let verdict = self.process_item_guarded(batch_id, item, cancel).await;
                self.emit_terminal(events, batch_id, index, item, &verdict).await;
                (index, verdict)
            }))
            .await;

            for (index, verdict) in finished {
                verdicts[index] = Some(verdict);
            }
        }

        let mut summary = BatchSummary::default();
        let verdicts: Vec<(String, Verdict)> = items
            .into_iter()
            .zip(verdicts)
            .map(|(item, verdict)| {
                let verdict =
                    verdict.unwrap_or_else(|| Verdict::Error("item was not processed".to_string()));
                summary.record(&verdict);
                (item, verdict)
            })
            .collect();

        info!(
            batch_id = %batch_id,
            total = summary.total,
            found = summary.found,
            no_result = summary.no_result,
            failed = summary.failed,
            cancelled = cancel.is_cancelled(),
            "Batch completed"
        );

        emit_event(events, ProgressEvent::BatchCompleted { batch_id, summary }).await;

        BatchReport {
            batch_id,
            verdicts,
            summary,
        }
    }

    /// Spawn a batch on the runtime and return a handle to observe or cancel it
    pub fn submit_batch(self: Arc<Self>, items: Vec<String>) -> BatchHandle {
        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move { self.run_batch(items, &tx, &task_cancel).await });

        BatchHandle {
            events: rx,
            cancel,
            task,
        }
    }

    /// Process one item with panic isolation
    async fn process_item_guarded(
        &self,
        batch_id: Uuid,
        item: &str,
        cancel: &CancellationToken,
    ) -> Verdict {
        isolate_item(batch_id, item, self.process_item(item, cancel)).await
    }

    async fn process_item(&self, item: &str, cancel: &CancellationToken) -> Verdict {
        if item.trim().is_empty() {
            return Verdict::Error(EMPTY_TITLE.to_string());
        }

        let candidates = match self.config.mode {
            AggregationMode::Consensus => self.run_all_sources(item, cancel).await,
            AggregationMode::FirstHit => self.run_until_first_hit(item, cancel).await,
        };

        let verdict = self.reconciler.reconcile(&candidates);
        if verdict != Verdict::NoResultFound {
            return verdict;
        }

        if cancel.is_cancelled() {
            return Verdict::Error(CANCELLED.to_string());
        }

        let failures: Vec<String> = candidates
            .iter()
            .filter_map(|c| {
                c.failure()
                    .filter(|f| !f.is_clean_miss())
                    .map(|f| format!("{}: {}", c.source, f))
            })
            .collect();
        if !failures.is_empty() {
            warn!(
                item = %item,
                failures = %failures.join("; "),
                "No date found; some sources failed"
            );
        }

        verdict
    }

    /// Consensus mode: every source, at most `source_concurrency` at once
    async fn run_all_sources(&self, item: &str, cancel: &CancellationToken) -> Vec<Candidate> {
        let runs: Vec<_> = self
            .table
            .entries()
            .iter()
            .map(|entry| {
                self.runner
                    .run(item, &entry.descriptor, entry.probe.as_ref(), cancel)
            })
            .collect();

        stream::iter(runs)
            .buffer_unordered(self.config.source_concurrency)
            .collect()
            .await
    }

    /// First-hit mode: sources in priority order, later sources skipped after a date
    async fn run_until_first_hit(&self, item: &str, cancel: &CancellationToken) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for entry in self.table.entries() {
            let candidate = self
                .runner
                .run(item, &entry.descriptor, entry.probe.as_ref(), cancel)
                .await;
            let hit = candidate.raw_date().is_some();
            candidates.push(candidate);

            if hit {
                debug!(
                    item = %item,
                    source = %entry.descriptor.name,
                    "First hit, skipping remaining sources"
                );
                break;
            }
            if cancel.is_cancelled() {
                break;
            }
        }

        candidates
    }

    async fn emit_terminal(
        &self,
        events: &mpsc::Sender<ProgressEvent>,
        batch_id: Uuid,
        index: usize,
        item: &str,
        verdict: &Verdict,
    ) {
        let event = match verdict {
            Verdict::Error(reason) => {
                warn!(batch_id = %batch_id, item = %item, reason = %reason, "Item failed");
                ProgressEvent::ItemFailed {
                    batch_id,
                    index,
                    item: item.to_string(),
                    reason: reason.clone(),
                }
            }
            _ => {
                info!(batch_id = %batch_id, item = %item, verdict = %verdict, "Item completed");
                ProgressEvent::ItemCompleted {
                    batch_id,
                    index,
                    item: item.to_string(),
                    verdict: verdict.clone(),
                }
            }
        };
        emit_event(events, event).await;
    }
}

/// Run one item's work, turning a panic into a failed verdict
async fn isolate_item<F>(batch_id: Uuid, item: &str, work: F) -> Verdict
where
    F: Future<Output = Verdict>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(verdict) => verdict,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(
                batch_id = %batch_id,
                item = %item,
                error = %message,
                "Item processing panicked (per-item error isolation)"
            );
            Verdict::Error(format!("unexpected failure: {}", message))
        }
    }
}

/// Send an event, ignoring a departed receiver
async fn emit_event(events: &mpsc::Sender<ProgressEvent>, event: ProgressEvent) {
    let _ = events.send(event).await;
}

// ============================================================================
// Batch Handle
// ============================================================================

/// Running batch spawned by [`BatchOrchestrator::submit_batch`]
pub struct BatchHandle {
    events: mpsc::Receiver<ProgressEvent>,
    cancel: CancellationToken,
    task: JoinHandle<BatchReport>,
}

impl BatchHandle {
    /// Progress events as they occur; ends after `BatchCompleted`
    pub fn events(&mut self) -> impl Stream<Item = ProgressEvent> + '_ {
        async_stream::stream! {
            while let Some(event) = self.events.recv().await {
                yield event;
            }
        }
    }

    /// Request cancellation of the batch
    pub fn cancel(&self) {
        info!("Batch cancellation requested");
        self.cancel.cancel();
    }

    /// Token cancelling this batch (e.g. for a signal handler)
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the batch to finish
    ///
    /// Undrained events are discarded so the batch never blocks on a full channel.
    pub async fn join(self) -> FinderResult<BatchReport> {
        let Self { events, task, .. } = self;
        drop(events);

        task.await.map_err(|e| {
            FinderError::Common(reldate_common::Error::Internal(format!(
                "batch task failed: {}",
                e
            )))
        })
    }
}
