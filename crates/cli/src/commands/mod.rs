//! CLI command implementations

pub mod persona;
pub mod run;
