//! Steam store probe
//!
//! Chain: `search-app-id` (store search → first app id) → `fetch-detail`
//! (app page → `.release_date .date`). App pages behind an age gate carry no
//! date block; the release column of the matching search row is used instead.
//! That column travels with the app id in the resolve step's value
//! (`<app id>|<search date>`), so the probe keeps no per-item state.

use super::http::{base_url, push_segment, HttpFetcher};
use super::text::{attr_value, class_text};
use crate::types::{
    ProbeError, ResourceHandle, SourceDescriptor, SourceProbe, StepKind, StepOutcome, StepSpec,
};
use async_trait::async_trait;
use tracing::debug;

const SEARCH_URL: &str = "https://store.steampowered.com/search/";
const APP_URL: &str = "https://store.steampowered.com/app";

/// Step names
pub const SEARCH_APP_ID: &str = "search-app-id";
pub const FETCH_DETAIL: &str = "fetch-detail";

/// Separates the app id from the search-row date in the resolved value
const RESOLVED_SEPARATOR: char = '|';

/// Steam chain
pub fn descriptor() -> SourceDescriptor {
    SourceDescriptor::new(
        "steam",
        vec![
            StepSpec::new(SEARCH_APP_ID, StepKind::Resolve),
            StepSpec::new(FETCH_DETAIL, StepKind::Extract),
        ],
    )
}

/// Steam probe
pub struct SteamProbe {
    http: HttpFetcher,
}

impl SteamProbe {
    pub fn new(http: HttpFetcher) -> Self {
        Self { http }
    }

    async fn search_app_id(&self, title: &str) -> Result<StepOutcome, ProbeError> {
        let mut url = base_url(SEARCH_URL)?;
        url.query_pairs_mut().append_pair("term", title);

        let Some(html) = self.http.get_text(url).await? else {
            return Ok(StepOutcome::NotFound);
        };

        match parse_first_result(&html) {
            Some((app_id, released)) => {
                debug!(title = %title, app_id = %app_id, "Steam app id resolved");
                Ok(StepOutcome::Value(resolved_value(&app_id, released.as_deref())))
            }
            None => Ok(StepOutcome::NotFound),
        }
    }

    async fn fetch_detail(&self, resolved: &str) -> Result<StepOutcome, ProbeError> {
        let (app_id, fallback) = split_resolved(resolved);
        let mut url = base_url(APP_URL)?;
        push_segment(&mut url, app_id)?;

        let page_date = match self.http.get_text(url).await? {
            Some(html) => parse_release_date(&html),
            None => None,
        };

        Ok(match page_date.or_else(|| fallback.map(str::to_string)) {
            Some(date) => StepOutcome::Value(date),
            None => StepOutcome::NotFound,
        })
    }
}

#[async_trait]
impl SourceProbe for SteamProbe {
    async fn step(
        &self,
        _handle: &ResourceHandle,
        step: &StepSpec,
        input: &str,
    ) -> Result<StepOutcome, ProbeError> {
        match step.name.as_str() {
            SEARCH_APP_ID => self.search_app_id(input).await,
            FETCH_DETAIL => self.fetch_detail(input).await,
            other => Err(ProbeError::Other(format!("unknown steam step '{}'", other))),
        }
    }
}

/// First search row: app id plus its release column, if any
fn parse_first_result(html: &str) -> Option<(String, Option<String>)> {
    const ROW_CLASS: &str = "search_result_row";

    let class_pos = html.find(ROW_CLASS)?;
    let row_start = html[..class_pos].rfind('<').unwrap_or(0);
    let after_class = class_pos + ROW_CLASS.len();
    let row_end = match html[after_class..].find(ROW_CLASS) {
        Some(next) => {
            let next_class = after_class + next;
            html[..next_class].rfind('<').unwrap_or(next_class)
        }
        None => html.len(),
    };
    let row = &html[row_start..row_end];

    let app_id = attr_value(row, "data-ds-appid")?
        .split(',')
        .next()?
        .trim()
        .to_string();
    if app_id.is_empty() {
        return None;
    }

    Some((app_id, class_text(row, &["search_released"])))
}

fn resolved_value(app_id: &str, search_date: Option<&str>) -> String {
    match search_date.map(str::trim).filter(|d| !d.is_empty()) {
        Some(date) => format!("{}{}{}", app_id, RESOLVED_SEPARATOR, date),
        None => app_id.to_string(),
    }
}

/// App id and optional search-row date
fn split_resolved(resolved: &str) -> (&str, Option<&str>) {
    match resolved.split_once(RESOLVED_SEPARATOR) {
        Some((app_id, date)) => (app_id.trim(), Some(date.trim()).filter(|d| !d.is_empty())),
        None => (resolved.trim(), None),
    }
}

/// `.release_date .date` on an app page
fn parse_release_date(html: &str) -> Option<String> {
    class_text(html, &["release_date", "date"])
}
