//! personatest CLI
//!
//! Terminal front-end: URL checks, persona listing and generation, and full
//! in-process testing runs.

pub mod client;
pub mod commands;
pub mod output;
