//! Wikipedia probe
//!
//! Chain: `search-title` (opensearch for "<title> video game" → article
//! title) → `fetch-detail` (raw article wikitext → infobox `released` field).

use super::http::{base_url, HttpFetcher};
use super::text::{find_date_in_text, strip_tags};
use crate::types::{
    ProbeError, ResourceHandle, SourceDescriptor, SourceProbe, StepKind, StepOutcome, StepSpec,
};
use async_trait::async_trait;
use tracing::debug;

const API_URL: &str = "https://en.wikipedia.org/w/api.php";
const INDEX_URL: &str = "https://en.wikipedia.org/w/index.php";

/// Step names
pub const SEARCH_TITLE: &str = "search-title";
pub const FETCH_DETAIL: &str = "fetch-detail";

/// Wikipedia chain
pub fn descriptor() -> SourceDescriptor {
    SourceDescriptor::new(
        "wikipedia",
        vec![
            StepSpec::new(SEARCH_TITLE, StepKind::Resolve),
            StepSpec::new(FETCH_DETAIL, StepKind::Extract),
        ],
    )
}

/// Wikipedia probe
pub struct WikipediaProbe {
    http: HttpFetcher,
}

impl WikipediaProbe {
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }

    async fn search_title(&self, title: &str) -> Result<StepOutcome, ProbeError> {
        let mut url = base_url(API_URL)?;
        url.query_pairs_mut()
            .append_pair("action", "opensearch")
            .append_pair("search", &format!("{} video game", title))
            .append_pair("limit", "1")
            .append_pair("namespace", "0")
            .append_pair("format", "json");

        let Some(body) = self.http.get_text(url).await? else {
            return Ok(StepOutcome::NotFound);
        };

        match parse_opensearch(&body)? {
            Some(article) => {
                debug!(title = %title, article = %article, "Wikipedia article resolved");
                Ok(StepOutcome::Value(article))
            }
            None => Ok(StepOutcome::NotFound),
        }
    }

    async fn fetch_detail(&self, article: &str) -> Result<StepOutcome, ProbeError> {
        let mut url = base_url(INDEX_URL)?;
        url.query_pairs_mut()
            .append_pair("title", article)
            .append_pair("action", "raw");

        let date = match self.http.get_text(url).await? {
            Some(wikitext) => parse_released_field(&wikitext),
            None => None,
        };

        Ok(date.map_or(StepOutcome::NotFound, StepOutcome::Value))
    }
}

#[async_trait]
impl SourceProbe for WikipediaProbe {
    async fn step(
        &self,
        _handle: &ResourceHandle,
        step: &StepSpec,
        input: &str,
    ) -> Result<StepOutcome, ProbeError> {
        match step.name.as_str() {
            SEARCH_TITLE => self.search_title(input).await,
            FETCH_DETAIL => self.fetch_detail(input).await,
            other => Err(ProbeError::Other(format!("unknown wikipedia step '{}'", other))),
        }
    }
}

/// First title of an opensearch response: `[query, [titles], [descriptions], [urls]]`
fn parse_opensearch(body: &str) -> Result<Option<String>, ProbeError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ProbeError::Parse(format!("opensearch response: {}", e)))?;

    Ok(value
        .get(1)
        .and_then(|titles| titles.get(0))
        .and_then(|title| title.as_str())
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string))
}

/// Date from the infobox `| released = ...` field
fn parse_released_field(wikitext: &str) -> Option<String> {
    let lower = wikitext.to_ascii_lowercase();

    let mut search = 0;
    while let Some(rel) = lower[search..].find("released") {
        let at = search + rel;
        search = at + "released".len();

        // Field name must follow a '|' and be followed by '='
        let before = lower[..at].trim_end_matches(|c: char| c == ' ' || c == '\t');
        if !before.ends_with('|') {
            continue;
        }
        let after = lower[search..].trim_start_matches(|c: char| c == ' ' || c == '\t');
        if !after.starts_with('=') {
            continue;
        }

        let value_start = search + (lower[search..].len() - after.len()) + 1;
        let value = field_value(&wikitext[value_start..]);
        let date = start_date_template(value).or_else(|| find_date_in_text(&strip_tags(value)));
        if date.is_some() {
            return date;
        }
    }
    None
}

/// Infobox field text up to the next `\n|` or the infobox end
fn field_value(text: &str) -> &str {
    let end = ["\n|", "\n}}"]
        .iter()
        .filter_map(|marker| text.find(marker))
        .min()
        .unwrap_or(text.len());
    &text[..end]
}

/// `{{Start date|2011|4|18}}` as `2011-04-18`
fn start_date_template(value: &str) -> Option<String> {
    let lower = value.to_ascii_lowercase();
    let at = lower.find("{{start date")?;
    let body = &value[at + 2..];
    let body = &body[..body.find("}}")?];

    let parts: Vec<u32> = body
        .split('|')
        .skip(1)
        .map(str::trim)
        .filter(|p| !p.contains('='))
        .map_while(|p| p.parse().ok())
        .collect();

    match parts.as_slice() {
        [year, month, day, ..] => Some(format!("{:04}-{:02}-{:02}", year, month, day)),
        _ => None,
    }
}
