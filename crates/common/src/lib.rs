//! personatest common library
//!
//! Persona acquisition, collection state, simulated test runs and the session
//! that ties them together. Shared by the web server and the CLI.

pub mod chat;
pub mod collection;
pub mod config;
pub mod error;
pub mod generator;
pub mod llm;
pub mod pipeline;
pub mod placeholder;
pub mod report;
pub mod session;
pub mod simulator;
pub mod source;
pub mod types;
pub mod url;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use crate::chat::{ChatLog, ChatMessage, Sender};
pub use crate::collection::{PersonaCollection, SharedCollection};
pub use crate::config::AppConfig;
pub use crate::error::{Error, Result};
pub use crate::generator::GeneratorClient;
pub use crate::llm::{ChatModel, LlmBackend, LlmClient};
pub use crate::pipeline::Pipeline;
pub use crate::report::TestReport;
pub use crate::session::{Session, SessionDeps, SessionSnapshot, UrlOutcome};
pub use crate::source::{PersonaSource, RemotePersonaSource};
pub use crate::types::*;
pub use crate::url::{is_valid_url, normalize_url, AvailabilityCheck};

/// personatest version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
