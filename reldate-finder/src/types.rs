//! Core Types and Trait Definitions for reldate-finder
//!
//! Defines the data contracts between the aggregation stages:
//! - **Probe boundary:** [`SourceProbe`] (one per external source)
//! - **Source run output:** [`Candidate`]
//! - **Reconciled output:** [`Verdict`]
//!
//! Sources are static configuration: a [`SourceTable`] is validated once at
//! engine construction and then only read, so concurrent runs share it through
//! an `Arc` without locking.

use crate::error::{FinderError, FinderResult};
use crate::normalizer::NormalizedDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Source Descriptors
// ============================================================================

/// Capability a probe step exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    /// Look the item up; yields an intermediate key for the next step
    Search,
    /// Resolve the item to a source-specific identifier
    Resolve,
    /// Terminal step; yields the raw date string
    Extract,
}

/// One step of a source's probe chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Step name passed to the probe (e.g. "search-app-id", "fetch-detail")
    pub name: String,
    /// Capability used by the step
    pub kind: StepKind,
}

impl StepSpec {
    /// Create a step
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Whether this step yields the date
    pub fn is_terminal(&self) -> bool {
        self.kind == StepKind::Extract
    }
}

/// Static per-source configuration
///
/// The chain is ordered. The last step, and only the last step, is
/// [`StepKind::Extract`]; every earlier step feeds its value to the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique source name
    pub name: String,
    /// Ordered probe steps
    pub steps: Vec<StepSpec>,
}

impl SourceDescriptor {
    /// Create a descriptor
    pub fn new(name: impl Into<String>, steps: Vec<StepSpec>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Check the chain shape
    pub fn validate(&self) -> FinderResult<()> {
        let invalid = |reason: &str| FinderError::InvalidDescriptor {
            source_name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("empty source name"));
        }
        let Some(last) = self.steps.last() else {
            return Err(invalid("no steps"));
        };
        if !last.is_terminal() {
            return Err(invalid("last step must be an extract step"));
        }
        if self.steps[..self.steps.len() - 1]
            .iter()
            .any(StepSpec::is_terminal)
        {
            return Err(invalid("extract step must be last"));
        }
        Ok(())
    }
}

// ============================================================================
// Probe Boundary
// ============================================================================

/// Opaque handle to a transient external resource (page-fetch handle, tab, ...)
///
/// Not `Clone`: [`SourceProbe::close`] consumes it, so each handle is released once.
#[derive(Debug, PartialEq, Eq)]
pub struct ResourceHandle {
    id: u64,
}

impl ResourceHandle {
    /// Wrap a probe-specific resource id
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    /// Handle for probes that hold no per-step resource
    pub fn detached() -> Self {
        Self { id: 0 }
    }

    /// Probe-specific resource id
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Result of one successful probe step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Identifier (search/resolve steps) or raw date (extract step)
    Value(String),
    /// Source has nothing for this input
    NotFound,
}

/// Error raised by a probe step
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Network communication error
    #[error("network error: {0}")]
    Network(String),

    /// Source answered with an HTTP error status
    #[error("HTTP {status}")]
    Http {
        /// Status code
        status: u16,
    },

    /// Page or payload could not be interpreted
    #[error("parse error: {0}")]
    Parse(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

/// External source probe
///
/// The engine treats every probe uniformly and never branches on source
/// identity. A step call must only return once its underlying fetch has
/// completed; the engine adds no settle delays of its own.
///
/// # Example
/// ```rust,ignore
/// use reldate_finder::types::{ProbeError, ResourceHandle, SourceProbe, StepOutcome, StepSpec};
///
/// struct FixedProbe;
///
/// #[async_trait::async_trait]
/// impl SourceProbe for FixedProbe {
///     async fn step(
///         &self,
///         _handle: &ResourceHandle,
///         _step: &StepSpec,
///         _input: &str,
///     ) -> Result<StepOutcome, ProbeError> {
///         Ok(StepOutcome::Value("March 3, 2023".into()))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait SourceProbe: Send + Sync {
    /// Acquire the transient resource a step runs against
    async fn open(&self, _step: &StepSpec) -> Result<ResourceHandle, ProbeError> {
        Ok(ResourceHandle::detached())
    }

    /// Perform one step
    ///
    /// # Arguments
    /// * `handle` - Resource acquired by [`SourceProbe::open`] for this step
    /// * `step` - Step being executed
    /// * `input` - Item title (first step) or the previous step's value
    async fn step(
        &self,
        handle: &ResourceHandle,
        step: &StepSpec,
        input: &str,
    ) -> Result<StepOutcome, ProbeError>;

    /// Release a resource acquired by [`SourceProbe::open`]
    async fn close(&self, _handle: ResourceHandle) {}
}

// ============================================================================
// Source Table
// ============================================================================

/// Descriptor paired with its probe
#[derive(Clone)]
pub struct SourceEntry {
    /// Static chain description
    pub descriptor: SourceDescriptor,
    /// Probe implementation
    pub probe: Arc<dyn SourceProbe>,
}

impl SourceEntry {
    /// Pair a descriptor with a probe
    pub fn new(descriptor: SourceDescriptor, probe: Arc<dyn SourceProbe>) -> Self {
        Self { descriptor, probe }
    }
}

impl fmt::Debug for SourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceEntry")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Validated, ordered source table
///
/// Priority is declaration order: index 0 is the highest priority.
#[derive(Debug, Clone)]
pub struct SourceTable {
    entries: Vec<SourceEntry>,
}

impl SourceTable {
    /// Validate and build the table
    ///
    /// # Errors
    /// - [`FinderError::NoSources`] for an empty list
    /// - [`FinderError::DuplicateSource`] when two entries share a name
    /// - [`FinderError::InvalidDescriptor`] for a malformed chain
    pub fn new(entries: Vec<SourceEntry>) -> FinderResult<Self> {
        if entries.is_empty() {
            return Err(FinderError::NoSources);
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            entry.descriptor.validate()?;
            if !seen.insert(entry.descriptor.name.as_str()) {
                return Err(FinderError::DuplicateSource(entry.descriptor.name.clone()));
            }
        }

        Ok(Self { entries })
    }

    /// Entries in priority order
    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    /// Priority index of a source (lower is preferred)
    pub fn priority_of(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.descriptor.name == name)
    }

    /// Source names in priority order
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.descriptor.name.as_str())
            .collect()
    }

    /// Number of sources
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a constructed table
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Candidates
// ============================================================================

/// Why a source produced no date for an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFailure {
    /// A search/resolve step found nothing
    NoMatch,
    /// Item found, but the extract step had no date
    NoDate,
    /// A step exceeded the per-step timeout
    Timeout,
    /// Batch was cancelled while the source was running
    Cancelled,
    /// Probe raised an error
    Probe(String),
}

impl SourceFailure {
    /// Clean miss (the source answered, it just had nothing)
    pub fn is_clean_miss(&self) -> bool {
        matches!(self, SourceFailure::NoMatch | SourceFailure::NoDate)
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFailure::NoMatch => write!(f, "no match"),
            SourceFailure::NoDate => write!(f, "no date"),
            SourceFailure::Timeout => write!(f, "timeout"),
            SourceFailure::Cancelled => write!(f, "cancelled"),
            SourceFailure::Probe(cause) => write!(f, "probe error: {}", cause),
        }
    }
}

/// Outcome of one source chain for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Source name
    pub source: String,
    /// Raw date, or the failure reason
    pub result: Result<String, SourceFailure>,
}

impl Candidate {
    /// Candidate carrying a raw date
    pub fn dated(source: impl Into<String>, raw_date: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            result: Ok(raw_date.into()),
        }
    }

    /// Candidate carrying a failure
    pub fn failed(source: impl Into<String>, failure: SourceFailure) -> Self {
        Self {
            source: source.into(),
            result: Err(failure),
        }
    }

    /// Raw date if present and non-blank
    pub fn raw_date(&self) -> Option<&str> {
        match &self.result {
            Ok(raw) if !raw.trim().is_empty() => Some(raw.as_str()),
            _ => None,
        }
    }

    /// Failure reason, if any
    pub fn failure(&self) -> Option<&SourceFailure> {
        self.result.as_ref().err()
    }
}

// ============================================================================
// Verdict
// ============================================================================

/// Agreement level behind a found date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// One source supports the date
    Single,
    /// Several independent sources agree
    Multiple,
}

/// Final per-item answer
///
/// Serializes to the external wire shape:
/// `{date, supportingSources, confidence}`, `{noResultFound: true}` or `{error}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Best-supported date
    Found {
        /// Normalized date
        date: NormalizedDate,
        /// Sources whose candidates normalized to `date`, in priority order
        supporting_sources: Vec<String>,
    },
    /// Every source ran, none had a date
    NoResultFound,
    /// Item could not be processed
    Error(String),
}

impl Verdict {
    /// Derived confidence (only for found dates)
    pub fn confidence(&self) -> Option<Confidence> {
        match self {
            Verdict::Found {
                supporting_sources, ..
            } if supporting_sources.len() > 1 => Some(Confidence::Multiple),
            Verdict::Found { .. } => Some(Confidence::Single),
            _ => None,
        }
    }

    /// Date, if found
    pub fn date(&self) -> Option<&NormalizedDate> {
        match self {
            Verdict::Found { date, .. } => Some(date),
            _ => None,
        }
    }

    /// Supporting sources (empty unless found)
    pub fn supporting_sources(&self) -> &[String] {
        match self {
            Verdict::Found {
                supporting_sources, ..
            } => supporting_sources,
            _ => &[],
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Verdict::Found {
                date,
                supporting_sources,
            } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("date", date)?;
                map.serialize_entry("supportingSources", supporting_sources)?;
                map.serialize_entry("confidence", &self.confidence())?;
                map.end()
            }
            Verdict::NoResultFound => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("noResultFound", &true)?;
                map.end()
            }
            Verdict::Error(reason) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", reason)?;
                map.end()
            }
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Found {
                date,
                supporting_sources,
            } => match supporting_sources.as_slice() {
                [only] => write!(f, "{} (from {})", date, only),
                many => write!(f, "{} ({} sources agree)", date, many.len()),
            },
            Verdict::NoResultFound => write!(f, "No release date found"),
            Verdict::Error(reason) => write!(f, "Error: {}", reason),
        }
    }
}
