//! Built-in source probes
//!
//! Each known source is a tagged variant with a static descriptor and an
//! HTTP-backed [`SourceProbe`]. Page-scraping heuristics live here, outside the
//! engine; the engine only sees the probe trait.
//!
//! | Source     | Chain                                   |
//! |------------|-----------------------------------------|
//! | steam      | search-app-id → fetch-detail            |
//! | wikipedia  | search-title → fetch-detail             |
//! | metacritic | fetch-detail                            |
//! | google     | fetch-detail (not enabled by default)   |

pub mod google;
pub mod http;
pub mod metacritic;
pub mod steam;
pub mod text;
pub mod wikipedia;

use crate::error::{FinderError, FinderResult};
use crate::types::{SourceDescriptor, SourceEntry, SourceProbe, SourceTable};
use http::HttpFetcher;
use reldate_common::config::HttpSection;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Known external sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownSource {
    Steam,
    Wikipedia,
    Metacritic,
    Google,
}

impl KnownSource {
    /// Every built-in source
    pub const ALL: [KnownSource; 4] = [
        KnownSource::Steam,
        KnownSource::Wikipedia,
        KnownSource::Metacritic,
        KnownSource::Google,
    ];

    /// Source name used in configuration and verdicts
    pub fn name(self) -> &'static str {
        match self {
            KnownSource::Steam => "steam",
            KnownSource::Wikipedia => "wikipedia",
            KnownSource::Metacritic => "metacritic",
            KnownSource::Google => "google",
        }
    }

    /// Static chain description
    pub fn descriptor(self) -> SourceDescriptor {
        match self {
            KnownSource::Steam => steam::descriptor(),
            KnownSource::Wikipedia => wikipedia::descriptor(),
            KnownSource::Metacritic => metacritic::descriptor(),
            KnownSource::Google => google::descriptor(),
        }
    }

    /// HTTP-backed probe with its own rate limiter
    pub fn probe(self, settings: &HttpSection) -> FinderResult<Arc<dyn SourceProbe>> {
        let http = HttpFetcher::new(self.name(), settings)?;
        Ok(match self {
            KnownSource::Steam => Arc::new(steam::SteamProbe::new(http)),
            KnownSource::Wikipedia => Arc::new(wikipedia::WikipediaProbe::new(http)),
            KnownSource::Metacritic => Arc::new(metacritic::MetacriticProbe::new(http)),
            KnownSource::Google => Arc::new(google::GoogleProbe::new(http)),
        })
    }
}

impl FromStr for KnownSource {
    type Err = FinderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        KnownSource::ALL
            .into_iter()
            .find(|source| source.name() == wanted)
            .ok_or_else(|| FinderError::UnknownSource(s.trim().to_string()))
    }
}

impl fmt::Display for KnownSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build the source table for `names`, in the given priority order
///
/// # Errors
/// - [`FinderError::UnknownSource`] for a name with no built-in probe
/// - [`FinderError::NoSources`] / [`FinderError::DuplicateSource`] from table validation
pub fn build_source_table(names: &[String], settings: &HttpSection) -> FinderResult<SourceTable> {
    let entries = names
        .iter()
        .map(|name| {
            let source: KnownSource = name.parse()?;
            debug!(source = %source, "Enabling source");
            Ok(SourceEntry::new(source.descriptor(), source.probe(settings)?))
        })
        .collect::<FinderResult<Vec<_>>>()?;

    SourceTable::new(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("Steam".parse::<KnownSource>().unwrap(), KnownSource::Steam);
        assert!(matches!(
            "gog".parse::<KnownSource>(),
            Err(FinderError::UnknownSource(name)) if name == "gog"
        ));
    }

    #[test]
    fn test_every_descriptor_is_valid() {
        for source in KnownSource::ALL {
            let descriptor = source.descriptor();
            assert!(descriptor.validate().is_ok());
            assert_eq!(descriptor.name, source.name());
        }
    }

    #[test]
    fn test_table_keeps_priority_order() {
        let table =
            build_source_table(&names(&["wikipedia", "steam"]), &HttpSection::default()).unwrap();
        assert_eq!(table.names(), vec!["wikipedia", "steam"]);
    }

    #[test]
    fn test_table_rejects_bad_lists() {
        let http = HttpSection::default();
        assert!(matches!(
            build_source_table(&[], &http),
            Err(FinderError::NoSources)
        ));
        assert!(matches!(
            build_source_table(&names(&["steam", "steam"]), &http),
            Err(FinderError::DuplicateSource(_))
        ));
        assert!(matches!(
            build_source_table(&names(&["steam", "origin"]), &http),
            Err(FinderError::UnknownSource(_))
        ));
    }
}
