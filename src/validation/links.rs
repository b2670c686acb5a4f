//! External link checks for the persona's link list.
//!
//! Links are kept only when well formed and, when HTTP probing is enabled,
//! reachable. A GitHub profile URL in first position is always kept.

use std::collections::BTreeSet;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};

static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+(:\d+)?(/\S*)?$").unwrap());

/// Default budget for one probe.
pub const DEFAULT_LINK_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether `url` is an absolute http(s) URL with a dotted host.
pub fn is_well_formed(url: &str) -> bool {
    URL.is_match(url.trim())
}

fn is_github_url(url: &str) -> bool {
    let url = url.trim();
    url.starts_with("https://github.com/") || url.starts_with("http://github.com/")
}

fn is_accepted(status: StatusCode) -> bool {
    !(status.is_client_error() || status.is_server_error())
}

/// Filters link lists.
#[derive(Debug, Clone, Default)]
pub struct LinkChecker {
    client: Option<Client>,
}

impl LinkChecker {
    /// Format checks only; never touches the network.
    pub fn offline() -> Self {
        Self { client: None }
    }

    /// Format checks plus an HTTP probe of every link.
    pub fn with_http(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client: Some(client),
        })
    }

    pub fn probes_http(&self) -> bool {
        self.client.is_some()
    }

    /// Whether `url` should stay in the document.
    pub async fn is_reachable(&self, url: &str) -> bool {
        if !is_well_formed(url) {
            return false;
        }
        let Some(client) = &self.client else {
            return true;
        };
        let url = url.trim();
        let result = match client.head(url).send().await {
            // 405 means the resource exists but refuses HEAD.
            Ok(resp) if is_accepted(resp.status()) || resp.status() == StatusCode::METHOD_NOT_ALLOWED => {
                return true;
            }
            // Some hosts reject HEAD outright; GET decides.
            Ok(resp) => {
                log::debug!("HEAD {} returned {}; retrying with GET", url, resp.status());
                client.get(url).send().await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(resp) => is_accepted(resp.status()),
            Err(e) => {
                log::debug!("Link {} unreachable: {}", url, e);
                false
            }
        }
    }

    /// Drop duplicate, malformed and unreachable links. A GitHub URL in
    /// first position is kept unconditionally.
    pub async fn filter_links(&self, links: &[String]) -> Vec<String> {
        let mut kept = Vec::new();
        let mut seen = BTreeSet::new();
        for (idx, link) in links.iter().enumerate() {
            let link = link.trim();
            if !seen.insert(link.to_string()) {
                continue;
            }
            if (idx == 0 && is_github_url(link)) || self.is_reachable(link).await {
                kept.push(link.to_string());
            } else {
                log::info!("Dropping unreachable link {}", link);
            }
        }
        kept
    }
}
