//! Metacritic probe
//!
//! Single extract step against the game search results page: the detail
//! block (`.release_data`) when present, else the first result's
//! `.main_stats .release_date`.

use super::http::{base_url, push_segment, HttpFetcher};
use super::text::{class_section, date_after_label, find_date_in_text, html_to_text};
use crate::types::{
    ProbeError, ResourceHandle, SourceDescriptor, SourceProbe, StepKind, StepOutcome, StepSpec,
};
use async_trait::async_trait;

const SEARCH_URL: &str = "https://www.metacritic.com/search/game";

/// Characters of markup scanned after a matched element
const SECTION_WINDOW: usize = 400;

/// Step name
pub const FETCH_DETAIL: &str = "fetch-detail";

/// Metacritic chain
pub fn descriptor() -> SourceDescriptor {
    SourceDescriptor::new(
        "metacritic",
        vec![StepSpec::new(FETCH_DETAIL, StepKind::Extract)],
    )
}

/// Metacritic probe
pub struct MetacriticProbe {
    http: HttpFetcher,
}

impl MetacriticProbe {
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SourceProbe for MetacriticProbe {
    async fn step(
        &self,
        _handle: &ResourceHandle,
        step: &StepSpec,
        input: &str,
    ) -> Result<StepOutcome, ProbeError> {
        if step.name != FETCH_DETAIL {
            return Err(ProbeError::Other(format!(
                "unknown metacritic step '{}'",
                step.name
            )));
        }

        let mut url = base_url(SEARCH_URL)?;
        push_segment(&mut url, input)?;
        push_segment(&mut url, "results")?;

        let date = match self.http.get_text(url).await? {
            Some(html) => parse_release_date(&html),
            None => None,
        };
        Ok(date.map_or(StepOutcome::NotFound, StepOutcome::Value))
    }
}

fn parse_release_date(html: &str) -> Option<String> {
    class_section(html, &["release_data"], SECTION_WINDOW)
        .and_then(|text| find_date_in_text(&text))
        .or_else(|| {
            class_section(html, &["main_stats", "release_date"], SECTION_WINDOW)
                .and_then(|text| find_date_in_text(&text))
        })
        .or_else(|| date_after_label(&html_to_text(html), &["release date:"], 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_block() {
        let html = r#"<li class="summary_detail release_data">
            <span class="label">Release Date:</span>
            <span class="data">Feb 24, 2023</span></li>"#;
        assert_eq!(parse_release_date(html), Some("Feb 24 2023".to_string()));
    }

    #[test]
    fn test_search_result_row() {
        let html = r#"<div class="result"><div class="main_stats">
            <p>PC Game</p><span class="release_date">Release Date: <span>Oct 10, 2007</span></span>
            </div></div>"#;
        assert_eq!(parse_release_date(html), Some("Oct 10 2007".to_string()));
    }

    #[test]
    fn test_no_results() {
        assert_eq!(parse_release_date("<p>No search results found.</p>"), None);
    }
}
