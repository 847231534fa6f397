//! Error types for reldate-finder
//!
//! Only caller misuse surfaces as an error. Probe failures, timeouts and
//! per-item bugs are converted into typed outcomes (see [`crate::types::SourceFailure`]
//! and [`crate::workflow::ProgressEvent::ItemFailed`]) and never reach this type.

use thiserror::Error;

/// Engine construction / configuration error
#[derive(Debug, Error)]
pub enum FinderError {
    /// Source table has no entries
    #[error("No sources configured")]
    NoSources,

    /// Two sources share a name
    #[error("Duplicate source name: {0}")]
    DuplicateSource(String),

    /// Source name not known to the built-in probe set
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Descriptor step chain is malformed
    #[error("Invalid descriptor for source '{source_name}': {reason}")]
    InvalidDescriptor {
        /// Offending source
        source_name: String,
        /// What is wrong with the chain
        reason: String,
    },

    /// Engine configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// reldate-common error
    #[error("Common error: {0}")]
    Common(#[from] reldate_common::Error),
}

/// Result type for engine construction
pub type FinderResult<T> = Result<T, FinderError>;
