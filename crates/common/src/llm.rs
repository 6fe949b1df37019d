//! LLM backends used by the persona generator

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{LlmConfig, LlmKind};
use crate::error::{Error, Result};

const OPENAI_URL: &str = "https://api.openai.com";

#[derive(Debug, Clone, PartialEq)]
pub enum LlmBackend {
    /// Ollama local LLM
    Ollama { base_url: String, model: String },
    /// vLLM server
    Vllm { base_url: String, model: String },
    /// OpenAI-compatible API
    OpenAi {
        base_url: String,
        api_key: String,
        model: String,
    },
    /// No backend configured
    Disabled,
}

impl LlmBackend {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let backend = match config.kind {
            LlmKind::Ollama => LlmBackend::Ollama {
                base_url: config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string()),
                model: config.model.clone().unwrap_or_else(|| "llama3.2".to_string()),
            },
            LlmKind::Vllm => LlmBackend::Vllm {
                base_url: config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:8000".to_string()),
                model: config.model.clone().unwrap_or_else(|| "default".to_string()),
            },
            LlmKind::Openai => LlmBackend::OpenAi {
                base_url: config.base_url.clone().unwrap_or_else(|| OPENAI_URL.to_string()),
                api_key: config
                    .api_key
                    .clone()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| Error::InvalidConfig("OpenAI backend needs an API key".into()))?,
                model: config.model.clone().unwrap_or_else(|| "gpt-3.5-turbo".to_string()),
            },
            LlmKind::None => LlmBackend::Disabled,
        };
        Ok(backend)
    }

    pub fn name(&self) -> &'static str {
        match self {
            LlmBackend::Ollama { .. } => "ollama",
            LlmBackend::Vllm { .. } => "vllm",
            LlmBackend::OpenAi { .. } => "openai",
            LlmBackend::Disabled => "disabled",
        }
    }
}

/// Anything that turns a system + user prompt into text
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// HTTP client for an [`LlmBackend`]
#[derive(Debug, Clone)]
pub struct LlmClient {
    backend: LlmBackend,
    client: reqwest::Client,
    temperature: f32,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(backend: LlmBackend, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            backend,
            client,
            temperature: 0.7,
            max_tokens: 2000,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut llm = Self::new(
            LlmBackend::from_config(config)?,
            Duration::from_secs(config.timeout_secs),
        )?;
        llm.temperature = config.temperature;
        llm.max_tokens = config.max_tokens;
        Ok(llm)
    }

    pub fn backend(&self) -> &LlmBackend {
        &self.backend
    }

    async fn post_json(&self, service: &str, request: reqwest::RequestBuilder) -> Result<serde_json::Value> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("{} returned status {}", service, status);
            return Err(Error::Upstream {
                service: service.to_string(),
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    fn chat_body(&self, model: &str, system: &str, user: &str, json_mode: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

fn chat_content(json: &serde_json::Value) -> Option<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(String::from)
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let text = match &self.backend {
            LlmBackend::Ollama { base_url, model } => {
                let body = serde_json::json!({
                    "model": model,
                    "prompt": format!("{}\n\nUser: {}", system, user),
                    "stream": false,
                    "format": "json",
                    "options": {"temperature": self.temperature},
                });
                let url = format!("{}/api/generate", base_url.trim_end_matches('/'));
                let json = self.post_json("ollama", self.client.post(&url).json(&body)).await?;
                json.get("response").and_then(|v| v.as_str()).map(String::from)
            }
            LlmBackend::Vllm { base_url, model } => {
                let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
                let body = self.chat_body(model, system, user, false);
                let json = self.post_json("vllm", self.client.post(&url).json(&body)).await?;
                chat_content(&json)
            }
            LlmBackend::OpenAi {
                base_url,
                api_key,
                model,
            } => {
                let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
                let body = self.chat_body(model, system, user, true);
                let request = self.client.post(&url).bearer_auth(api_key).json(&body);
                let json = self.post_json("openai", request).await?;
                chat_content(&json)
            }
            LlmBackend::Disabled => {
                return Err(Error::Llm("no LLM backend configured".into()));
            }
        };

        let text = text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Llm(format!("empty response from {}", self.backend.name())))?;
        debug!(backend = self.backend.name(), chars = text.len(), "LLM completion received");
        Ok(text)
    }
}
