//! Directory-service client.
//!
//! An external discovery API maps an image search string to candidate mirror
//! locations. The orchestrator consults it ahead of the static registry list
//! when `enable_advanced_api` is set.

use std::fmt::Write as _;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::error::{ImageError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One candidate returned by the directory service.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryRecord {
    /// Upstream source reference (e.g. "docker.io/library/alpine:3.19").
    #[serde(default)]
    pub source: String,
    /// Mirror location as `<host>/<path>`, no scheme.
    #[serde(default)]
    pub mirror: String,
    /// Platform string (e.g. "linux/amd64").
    #[serde(default)]
    pub platform: String,
    /// Human-readable size.
    #[serde(default)]
    pub size: String,
    /// Publication timestamp.
    #[serde(default, rename = "createdAt")]
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
struct DirectoryEnvelope {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    results: Vec<DirectoryRecord>,
    #[serde(default)]
    search: String,
}

/// The service answers either a wrapped envelope or a bare result array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DirectoryResponse {
    Wrapped(DirectoryEnvelope),
    Bare(Vec<DirectoryRecord>),
}

/// HTTP client for the directory service.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    base_url: String,
    http: Client,
}

impl DirectoryClient {
    /// Creates a client for the service at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, http: Client) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, http }
    }

    /// Runs one search query.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::DirectoryRejected`] when the service flags the
    /// search as failed or answers non-200.
    pub async fn search(
        &self,
        term: &str,
        site: Option<&str>,
        platform: Option<&str>,
    ) -> Result<Vec<DirectoryRecord>> {
        let mut url = format!(
            "{}/image?search={}",
            self.base_url,
            urlencoding::encode(term)
        );
        if let Some(site) = site {
            let _ = write!(url, "&site={}", urlencoding::encode(site));
        }
        if let Some(platform) = platform {
            let _ = write!(url, "&platform={}", urlencoding::encode(platform));
        }
        debug!(url = %url, "querying directory service");

        let response = self
            .http
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(ImageError::DirectoryRejected(format!(
                "{term} (status {})",
                response.status().as_u16()
            )));
        }

        match response.json().await? {
            DirectoryResponse::Wrapped(envelope) => {
                if envelope.error {
                    let search = if envelope.search.is_empty() {
                        term.to_string()
                    } else {
                        envelope.search
                    };
                    return Err(ImageError::DirectoryRejected(search));
                }
                Ok(envelope.results)
            }
            DirectoryResponse::Bare(results) => Ok(results),
        }
    }

    /// Searches `repository:tag` first, falling back to the bare repository
    /// when the precise query errors or comes back empty.
    ///
    /// # Errors
    ///
    /// Returns the fallback query's error when both queries fail.
    pub async fn search_with_fallback(
        &self,
        repository: &str,
        tag: &str,
        platform: Option<&str>,
    ) -> Result<Vec<DirectoryRecord>> {
        let term = format!("{repository}:{tag}");
        match self.search(&term, None, platform).await {
            Ok(results) if !results.is_empty() => Ok(results),
            _ => self.search(repository, None, platform).await,
        }
    }
}

/// Picks the best candidate: the first record whose source mentions
/// docker.io, else the first record.
#[must_use]
pub fn best_match(results: &[DirectoryRecord]) -> Option<&DirectoryRecord> {
    results
        .iter()
        .find(|r| r.source.contains("docker.io"))
        .or_else(|| results.first())
}

/// Splits a mirror location into `(host, repository path)`. A scheme prefix
/// is preserved on the host part so loopback test registries stay reachable.
#[must_use]
pub fn split_mirror(mirror: &str) -> Option<(String, String)> {
    let (scheme, rest) = match mirror.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, mirror),
    };
    let (host, path) = rest.split_once('/')?;
    if host.is_empty() || path.is_empty() {
        return None;
    }
    let host = match scheme {
        Some(scheme) => format!("{scheme}://{host}"),
        None => host.to_string(),
    };
    Some((host, path.to_string()))
}
