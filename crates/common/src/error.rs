//! Error types for personatest

use thiserror::Error;

/// Result type alias using the personatest Error
pub type Result<T> = std::result::Result<T, Error>;

/// personatest error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid persona: {}", .0.join(", "))]
    InvalidPersona(Vec<String>),

    #[error("{service} returned status {status}: {message}")]
    Upstream {
        service: String,
        status: u16,
        message: String,
    },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("Persona {0} is locked")]
    Locked(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Test run failed: {0}")]
    TestRun(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(kind: &str, id: &str) -> Self {
        Error::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }

    /// Whether the error came from a remote collaborator rather than the caller's input.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Upstream { .. } | Error::Llm(_) | Error::Serialization(_)
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
