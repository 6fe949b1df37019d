//! URL validation and reachability

use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex_lite::Regex;
use std::time::Duration;
use tracing::{debug, warn};
use ::url::Url;

use crate::error::{Error, Result};

static HOSTNAME: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]+(\.[a-z0-9-]+)*\.[a-z]{2,}$").ok());

/// Sites offered by "try a random URL"
pub const DEMO_URLS: &[&str] = &[
    "github.com",
    "stackoverflow.com",
    "dev.to",
    "news.ycombinator.com",
    "neal.fun",
    "theuselessweb.com",
    "hackertyper.com",
    "pointerpointer.com",
    "howmanypeopleareinspacerightnow.com",
    "cat-bounce.com",
    "papertoilet.com",
    "omfgdogs.com",
    "thisisnotajumpscare.com",
    "findtheinvisiblecow.com",
    "radiooooo.com",
    "archive.org",
    "musiclab.chromeexperiments.com",
    "stars.chromeexperiments.com",
    "quickdraw.withgoogle.com",
];

/// Parse user input into a URL, adding `https://` when no scheme is given.
///
/// Rejects empty input, input containing whitespace, and hostnames without a
/// dot-separated alphabetic TLD.
pub fn normalize_url(input: &str) -> Result<Url> {
    let candidate = input.trim().to_lowercase();
    if candidate.is_empty() {
        return Err(Error::Validation("URL is empty".into()));
    }
    if candidate.chars().any(char::is_whitespace) {
        return Err(Error::Validation(format!("'{}' contains whitespace", input.trim())));
    }

    let with_scheme = if candidate.starts_with("http://") || candidate.starts_with("https://") {
        candidate
    } else {
        format!("https://{}", candidate)
    };

    let parsed = Url::parse(&with_scheme)
        .map_err(|e| Error::Validation(format!("'{}' is not a URL: {}", input.trim(), e)))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Validation(format!("'{}' has no hostname", input.trim())))?;

    let host_ok = host.contains('.')
        && HOSTNAME
            .as_ref()
            .map(|re| re.is_match(host))
            .unwrap_or(false);
    if !host_ok {
        return Err(Error::Validation(format!("'{}' is not a valid hostname", host)));
    }

    Ok(parsed)
}

/// Syntactic URL check. Never panics.
pub fn is_valid_url(input: &str) -> bool {
    normalize_url(input).is_ok()
}

/// Pick one of the demo sites at random
pub fn random_url() -> &'static str {
    DEMO_URLS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("github.com")
}

/// Decides whether a URL is worth generating personas for
#[async_trait]
pub trait AvailabilityCheck: Send + Sync {
    async fn is_available(&self, url: &str) -> bool;
}

/// Availability is syntactic validity
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOnly;

#[async_trait]
impl AvailabilityCheck for FormatOnly {
    async fn is_available(&self, url: &str) -> bool {
        is_valid_url(url)
    }
}

/// Reachability check through a CORS proxy that answers `{status: {http_code}}`
#[derive(Debug, Clone)]
pub struct ProxyProbe {
    client: reqwest::Client,
    proxy_url: String,
}

impl ProxyProbe {
    pub fn new(proxy_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            proxy_url: proxy_url.into(),
        })
    }

    async fn probe(&self, url: &str) -> Result<bool> {
        let target = normalize_url(url)?;
        let response = self
            .client
            .get(&self.proxy_url)
            .query(&[("url", target.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Upstream {
                service: "probe".into(),
                status: response.status().as_u16(),
                message: "proxy request failed".into(),
            });
        }

        let body: serde_json::Value = response.json().await?;
        let code = body
            .pointer("/status/http_code")
            .and_then(|v| v.as_u64());
        Ok(code == Some(200))
    }
}

#[async_trait]
impl AvailabilityCheck for ProxyProbe {
    async fn is_available(&self, url: &str) -> bool {
        match self.probe(url).await {
            Ok(up) => {
                debug!(url, up, "Probe finished");
                up
            }
            Err(e) => {
                warn!(url, error = %e, "Probe failed, treating site as unavailable");
                false
            }
        }
    }
}
