//! HTTP client for a running personatest web server

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health document served at `/api/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub service: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub sessions: Option<usize>,
}

/// Client for the personatest web API
pub struct WebClient {
    client: reqwest::Client,
    base_url: String,
}

impl WebClient {
    /// `addr` may be a bare `host:port` or a full base URL
    pub fn new(addr: &str) -> Result<Self> {
        let base_url = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", addr.trim_end_matches('/'))
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the health document
    pub async fn health(&self) -> Result<Health> {
        let url = format!("{}/api/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("cannot reach {}", url))?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}
