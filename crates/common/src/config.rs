//! Configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Audience;

/// Top-level configuration shared by the web server and the CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Random-name and expansion endpoints
    pub backend: BackendConfig,

    /// Persona generator function endpoint
    pub generator: GeneratorConfig,

    /// LLM used by the generator functions
    pub llm: LlmConfig,

    /// Reachability probe
    pub probe: ProbeConfig,

    /// Session behavior
    pub session: SessionConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub listen: String,
    /// Sessions untouched for this long are evicted
    pub session_ttl_secs: u64,
    /// Upper bound on live sessions; the least recently used one makes room
    pub max_sessions: usize,
    /// How often idle sessions are swept
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            session_ttl_secs: 1800,
            max_sessions: 1000,
            sweep_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Remote persona service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// GET endpoint returning `{name, base_persona}`
    pub name_url: String,

    /// POST endpoint expanding a partial persona
    pub expand_url: String,

    /// Credential sent with every request
    pub api_key: Option<String>,

    /// Header carrying the credential
    pub api_key_header: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name_url: "http://127.0.0.1:8000/api/random-name".to_string(),
            expand_url: "http://127.0.0.1:8000/api/expand-persona".to_string(),
            api_key: None,
            api_key_header: "x-api-key".to_string(),
            timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Generator function endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/api/personas/generate".to_string(),
            timeout_secs: 120,
        }
    }
}

/// LLM backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmKind {
    Ollama,
    Vllm,
    Openai,
    None,
}

impl std::str::FromStr for LlmKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(LlmKind::Ollama),
            "vllm" => Ok(LlmKind::Vllm),
            "openai" => Ok(LlmKind::Openai),
            "none" | "" => Ok(LlmKind::None),
            other => Err(Error::InvalidConfig(format!("unknown LLM backend '{}'", other))),
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub kind: LlmKind,

    /// Base URL for Ollama / vLLM; ignored for OpenAI
    pub base_url: Option<String>,

    /// Model name; each backend has its own default
    pub model: Option<String>,

    /// OpenAI API key
    pub api_key: Option<String>,

    pub temperature: f32,

    pub max_tokens: u32,

    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            kind: LlmKind::None,
            base_url: None,
            model: None,
            api_key: None,
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 90,
        }
    }
}

/// Reachability probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// When false, availability is decided by URL syntax alone
    pub enabled: bool,

    /// CORS proxy returning `{status: {http_code}}`
    pub proxy_url: String,

    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            proxy_url: "https://api.allorigins.win/get".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Session behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Personas fetched when a URL is accepted
    pub persona_count: usize,

    /// Backstop that force-settles a stuck acquisition
    pub safety_timeout_secs: u64,

    /// Simulated per-persona test duration bounds
    pub test_delay_min_ms: u64,
    pub test_delay_max_ms: u64,

    /// Simulated persona reply delay bounds
    pub chat_delay_min_ms: u64,
    pub chat_delay_max_ms: u64,

    pub audience: Audience,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persona_count: 5,
            safety_timeout_secs: 15,
            test_delay_min_ms: 2000,
            test_delay_max_ms: 5000,
            chat_delay_min_ms: 500,
            chat_delay_max_ms: 2000,
            audience: Audience::Random,
        }
    }
}

impl SessionConfig {
    pub fn safety_timeout(&self) -> Duration {
        Duration::from_secs(self.safety_timeout_secs)
    }

    pub fn test_delay_range(&self) -> (Duration, Duration) {
        ordered_range(self.test_delay_min_ms, self.test_delay_max_ms)
    }

    pub fn chat_delay_range(&self) -> (Duration, Duration) {
        ordered_range(self.chat_delay_min_ms, self.chat_delay_max_ms)
    }
}

fn ordered_range(a: u64, b: u64) -> (Duration, Duration) {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    (Duration::from_millis(lo), Duration::from_millis(hi))
}

impl AppConfig {
    /// Load configuration from file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `PERSONATEST_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("PERSONATEST_LISTEN") {
            self.server.listen = v;
        }
        if let Some(v) = non_empty("PERSONATEST_NAME_URL") {
            self.backend.name_url = v;
        }
        if let Some(v) = non_empty("PERSONATEST_EXPAND_URL") {
            self.backend.expand_url = v;
        }
        if let Some(v) = non_empty("PERSONATEST_API_KEY") {
            self.backend.api_key = Some(v);
        }
        if let Some(v) = non_empty("PERSONATEST_GENERATOR_URL") {
            self.generator.endpoint = v;
        }
        if let Some(v) = non_empty("PERSONATEST_LLM_BACKEND") {
            self.llm.kind = v.parse()?;
        }
        if let Some(v) = non_empty("PERSONATEST_LLM_URL") {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = non_empty("PERSONATEST_LLM_MODEL") {
            self.llm.model = Some(v);
        }
        if let Some(v) = non_empty("OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = non_empty("PERSONATEST_PROBE_ENABLED") {
            self.probe.enabled = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = non_empty("PERSONATEST_PROBE_URL") {
            self.probe.proxy_url = v;
        }
        if let Some(v) = non_empty("PERSONATEST_PERSONA_COUNT") {
            self.session.persona_count = v
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("PERSONATEST_PERSONA_COUNT: '{}'", v)))?;
        }
        Ok(())
    }

    /// Reject values the session cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.session.persona_count == 0 {
            return Err(Error::InvalidConfig("session.persona_count must be at least 1".into()));
        }
        if self.session.safety_timeout_secs == 0 {
            return Err(Error::InvalidConfig("session.safety_timeout_secs must be positive".into()));
        }
        if self.server.max_sessions == 0 {
            return Err(Error::InvalidConfig("server.max_sessions must be at least 1".into()));
        }
        if self.llm.kind == LlmKind::Openai && self.llm.api_key.is_none() {
            return Err(Error::InvalidConfig("llm.kind = openai requires an API key".into()));
        }
        Ok(())
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".personatest")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = AppConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.session.persona_count, 5);
        assert_eq!(config.session.safety_timeout_secs, 15);
        assert_eq!(config.llm.kind, LlmKind::None);
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.backend.api_key = Some("secret".to_string());
        config.session.persona_count = 3;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.backend.api_key.as_deref(), Some("secret"));
        assert_eq!(loaded.session.persona_count, 3);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[session]\npersona_count = 2\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.session.persona_count, 2);
        assert_eq!(config.session.test_delay_max_ms, 5000);
        assert_eq!(config.backend.api_key_header, "x-api-key");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PERSONATEST_LLM_BACKEND", "ollama"),
            ("PERSONATEST_API_KEY", "k"),
            ("PERSONATEST_PERSONA_COUNT", "7"),
            ("PERSONATEST_PROBE_ENABLED", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.llm.kind, LlmKind::Ollama);
        assert_eq!(config.backend.api_key.as_deref(), Some("k"));
        assert_eq!(config.session.persona_count, 7);
        assert!(config.probe.enabled);
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_vars(|k| (k == "PERSONATEST_PERSONA_COUNT").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_validate() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.llm.kind = LlmKind::Openai;
        assert!(config.validate().is_err());

        config.llm.api_key = Some("sk".to_string());
        config.session.persona_count = 0;
        assert!(config.validate().is_err());

        config.session.persona_count = 5;
        config.server.max_sessions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_delay_range_is_ordered() {
        let session = SessionConfig {
            test_delay_min_ms: 50,
            test_delay_max_ms: 10,
            ..Default::default()
        };
        let (lo, hi) = session.test_delay_range();
        assert!(lo <= hi);
    }
}
