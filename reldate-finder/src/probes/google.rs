//! Google search probe
//!
//! Single extract step: the knowledge panel's `release_date` attribute block,
//! else a "Release date:" / "Released:" phrase in the result text.
//! Not enabled by default.

use super::http::{base_url, HttpFetcher};
use super::text::{date_after_label, find_date_in_text, html_to_text};
use crate::types::{
    ProbeError, ResourceHandle, SourceDescriptor, SourceProbe, StepKind, StepOutcome, StepSpec,
};
use async_trait::async_trait;

const SEARCH_URL: &str = "https://www.google.com/search";

/// Step name
pub const FETCH_DETAIL: &str = "fetch-detail";

/// Google chain
pub fn descriptor() -> SourceDescriptor {
    SourceDescriptor::new("google", vec![StepSpec::new(FETCH_DETAIL, StepKind::Extract)])
}

/// Google probe
pub struct GoogleProbe {
    http: HttpFetcher,
}

impl GoogleProbe {
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SourceProbe for GoogleProbe {
    async fn step(
        &self,
        _handle: &ResourceHandle,
        step: &StepSpec,
        input: &str,
    ) -> Result<StepOutcome, ProbeError> {
        if step.name != FETCH_DETAIL {
            return Err(ProbeError::Other(format!("unknown google step '{}'", step.name)));
        }

        let mut url = base_url(SEARCH_URL)?;
        url.query_pairs_mut()
            .append_pair("q", &format!("{} video game release date", input))
            .append_pair("hl", "en");

        let date = match self.http.get_text(url).await? {
            Some(html) => parse_release_date(&html),
            None => None,
        };
        Ok(date.map_or(StepOutcome::NotFound, StepOutcome::Value))
    }
}

fn parse_release_date(html: &str) -> Option<String> {
    knowledge_panel_date(html)
        .or_else(|| date_after_label(&html_to_text(html), &["release date:", "released:"], 60))
}

/// Text of the element carrying `data-attrid="...release_date..."`
fn knowledge_panel_date(html: &str) -> Option<String> {
    let mut search = 0;
    while let Some(rel) = html[search..].find("data-attrid=\"") {
        let value_start = search + rel + "data-attrid=\"".len();
        let value_end = html[value_start..].find('"')? + value_start;
        search = value_end;

        if !html[value_start..value_end].contains("release_date") {
            continue;
        }

        let block_end = html[value_end..]
            .find("data-attrid=\"")
            .map_or(html.len(), |i| i + value_end);
        if let Some(date) = find_date_in_text(&html_to_text(&html[value_end + 1..block_end])) {
            return Some(date);
        }
    }
    None
}
