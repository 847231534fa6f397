//! Rate-limited page fetcher shared by the built-in probes
//!
//! One fetcher per source: each source gets its own `governor` quota so a slow
//! storefront never throttles the encyclopedia.

use crate::error::{FinderError, FinderResult};
use crate::types::ProbeError;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reldate_common::config::HttpSection;
use reqwest::{Client, StatusCode, Url};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// HTTP GET with per-source rate limiting
pub struct HttpFetcher {
    source: &'static str,
    client: Client,
    rate_limiter: DefaultDirectRateLimiter,
}

impl HttpFetcher {
    /// Build a fetcher for `source`
    pub fn new(source: &'static str, settings: &HttpSection) -> FinderResult<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(|e| {
                FinderError::InvalidConfig(format!("failed to build HTTP client: {}", e))
            })?;

        let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            source,
            client,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    /// Fetch `url` as text
    ///
    /// # Returns
    /// - `Ok(Some(body))` on success
    /// - `Ok(None)` on 404 (the source has no such page)
    /// - `Err(ProbeError::Http)` on any other error status
    pub async fn get_text(&self, url: Url) -> Result<Option<String>, ProbeError> {
        self.rate_limiter.until_ready().await;

        debug!(source = self.source, url = %url, "Fetching page");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Network("request timed out".to_string())
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProbeError::Http {
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map(Some)
            .map_err(|e| ProbeError::Network(format!("failed to read body: {}", e)))
    }
}

/// Parse a compile-time URL constant
pub(crate) fn base_url(raw: &str) -> Result<Url, ProbeError> {
    Url::parse(raw).map_err(|e| ProbeError::Other(format!("bad URL '{}': {}", raw, e)))
}

/// Append one percent-encoded path segment
pub(crate) fn push_segment(url: &mut Url, segment: &str) -> Result<(), ProbeError> {
    let rendered = url.to_string();
    url.path_segments_mut()
        .map_err(|_| ProbeError::Other(format!("URL cannot take a path: {}", rendered)))?
        .push(segment);
    Ok(())
}
