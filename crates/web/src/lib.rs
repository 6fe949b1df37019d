//! personatest web API
//!
//! HTTP surface over testing sessions plus the persona generate function.

pub mod functions;
pub mod server;

pub use functions::FunctionResponse;
pub use server::{ApiError, WebServer};
