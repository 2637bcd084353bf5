#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod agent;
pub mod assistant;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod mcp;
pub mod provider;
pub mod repl;

pub use assistant::SearchAssistant;
pub use error::{Error, Result};
