use thiserror::Error;

/// Errors surfaced by the search assistant.
///
/// Transport and provider failures have their own error types; they are
/// folded into one of these variants at the [`crate::assistant`] boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required setting is missing. Nothing was started.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The tool server or agent could not be brought up. Any partial
    /// connection has already been closed.
    #[error("{0}")]
    Initialization(String),

    /// A single query failed. The assistant stays usable.
    #[error("Query error: {0}")]
    Query(String),
}

impl Error {
    pub(crate) fn initialization(cause: impl std::fmt::Display) -> Self {
        Self::Initialization(format!("Failed to initialize search assistant: {cause}"))
    }

    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    #[must_use]
    pub fn is_initialization(&self) -> bool {
        matches!(self, Self::Initialization(_))
    }

    #[must_use]
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
