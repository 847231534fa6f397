//! Test Helper Utilities
//!
//! Scripted probes and engine builders shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use reldate_finder::types::{
    ProbeError, ResourceHandle, SourceDescriptor, SourceEntry, SourceProbe, SourceTable,
    StepKind, StepOutcome, StepSpec,
};
use reldate_finder::{AggregationMode, BatchOrchestrator, EngineConfig, ProgressEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

static LOGGING: Once = Once::new();

/// Route engine logs through the test writer (shown for failing tests only)
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Scripted answer for one item
#[derive(Debug, Clone)]
pub enum Answer {
    /// Raw date string
    Date(String),
    /// Source has nothing
    Missing,
    /// Probe error
    Fail(String),
    /// Date after a delay
    Slow(Duration, String),
    /// Never answers within any test timeout
    Hang,
}

pub fn date(raw: &str) -> Answer {
    Answer::Date(raw.to_string())
}

pub fn slow(ms: u64, raw: &str) -> Answer {
    Answer::Slow(Duration::from_millis(ms), raw.to_string())
}

/// Single-step probe answering per item, tracking resource use
pub struct ScriptedProbe {
    answers: HashMap<String, Answer>,
    fallback: Answer,
    next_handle: AtomicU64,
    opened: AtomicUsize,
    closed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    invoked: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    /// Probe answering `fallback` for every unscripted item
    pub fn answering(fallback: Answer) -> Self {
        Self {
            answers: HashMap::new(),
            fallback,
            next_handle: AtomicU64::new(1),
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            invoked: Mutex::new(Vec::new()),
        }
    }

    /// Script the answer for one item
    pub fn with(mut self, item: &str, answer: Answer) -> Self {
        self.answers.insert(item.to_string(), answer);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open resources observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Items this probe was asked about, in call order
    pub fn invoked(&self) -> Vec<String> {
        self.invoked.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceProbe for ScriptedProbe {
    async fn open(&self, _step: &StepSpec) -> Result<ResourceHandle, ProbeError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Ok(ResourceHandle::new(
            self.next_handle.fetch_add(1, Ordering::SeqCst),
        ))
    }

    async fn step(
        &self,
        _handle: &ResourceHandle,
        _step: &StepSpec,
        input: &str,
    ) -> Result<StepOutcome, ProbeError> {
        self.invoked.lock().unwrap().push(input.to_string());

        match self.answers.get(input).unwrap_or(&self.fallback).clone() {
            Answer::Date(raw) => Ok(StepOutcome::Value(raw)),
            Answer::Missing => Ok(StepOutcome::NotFound),
            Answer::Fail(msg) => Err(ProbeError::Other(msg)),
            Answer::Slow(delay, raw) => {
                tokio::time::sleep(delay).await;
                Ok(StepOutcome::Value(raw))
            }
            Answer::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(StepOutcome::NotFound)
            }
        }
    }

    async fn close(&self, _handle: ResourceHandle) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Single extract-step descriptor
pub fn extract_only(name: &str) -> SourceDescriptor {
    SourceDescriptor::new(name, vec![StepSpec::new("fetch-detail", StepKind::Extract)])
}

/// Name a probe for [`engine`]
pub fn source<'a, P: SourceProbe + 'static>(
    name: &'a str,
    probe: &Arc<P>,
) -> (&'a str, Arc<dyn SourceProbe>) {
    let probe: Arc<dyn SourceProbe> = probe.clone();
    (name, probe)
}

/// Engine over `(name, probe)` pairs in priority order
pub fn engine(
    sources: Vec<(&str, Arc<dyn SourceProbe>)>,
    config: EngineConfig,
) -> BatchOrchestrator {
    init_test_logging();
    let entries = sources
        .into_iter()
        .map(|(name, probe)| SourceEntry::new(extract_only(name), probe))
        .collect();
    BatchOrchestrator::new(SourceTable::new(entries).unwrap(), config).unwrap()
}

/// Test configuration with a short step timeout
pub fn config(mode: AggregationMode, group_size: usize) -> EngineConfig {
    EngineConfig {
        mode,
        item_concurrency: group_size,
        step_timeout: Duration::from_millis(150),
        ..EngineConfig::default()
    }
}

pub fn titles(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Run a batch and collect every event it emitted
pub async fn run_collecting(
    engine: &BatchOrchestrator,
    items: &[&str],
) -> (reldate_finder::BatchReport, Vec<ProgressEvent>) {
    let (tx, mut rx) = mpsc::channel(1024);
    let report = engine
        .run_batch(titles(items), &tx, &CancellationToken::new())
        .await;
    drop(tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (report, events)
}

/// Position of the first event matching `pred`
pub fn position(events: &[ProgressEvent], pred: impl Fn(&ProgressEvent) -> bool) -> usize {
    events
        .iter()
        .position(pred)
        .unwrap_or_else(|| panic!("no matching event in {:#?}", events))
}

pub fn is_started(index: usize) -> impl Fn(&ProgressEvent) -> bool {
    move |e| matches!(e, ProgressEvent::ItemStarted { index: i, .. } if *i == index)
}

pub fn is_terminal(index: usize) -> impl Fn(&ProgressEvent) -> bool {
    move |e| e.is_terminal() && e.index() == Some(index)
}

/// Every item has exactly one start and one terminal event, start first,
/// and the batch-completed event is last
pub fn assert_event_contract(events: &[ProgressEvent], items: usize) {
    for index in 0..items {
        let starts = events.iter().filter(|e| is_started(index)(*e)).count();
        let ends = events.iter().filter(|e| is_terminal(index)(*e)).count();
        assert_eq!(starts, 1, "item {} started {} times", index, starts);
        assert_eq!(ends, 1, "item {} finished {} times", index, ends);
        assert!(position(events, is_started(index)) < position(events, is_terminal(index)));
    }

    assert!(
        matches!(events.last(), Some(ProgressEvent::BatchCompleted { .. })),
        "batch completion must be the last event"
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::BatchCompleted { .. }))
            .count(),
        1
    );
}
