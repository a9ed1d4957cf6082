//! Error types for the avatar overlay.
//!
//! Validation errors are resolved at the command boundary (HTTP handler or
//! tool call) and never leave the store half-updated.

use thiserror::Error;

/// Errors raised while loading the expression catalog.
///
/// These never reach callers of [`crate::catalog::Catalog::load`]; the loader
/// logs them and falls back to the built-in default entry.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("failed to read expression catalog: {0}")]
    Io(#[from] std::io::Error),

    /// The catalog file is not valid JSON in a supported shape.
    #[error("failed to parse expression catalog: {0}")]
    Parse(#[from] serde_json::Error),

    /// The catalog parsed but contained no usable entries.
    #[error("expression catalog is empty")]
    Empty,
}

/// Errors produced by avatar commands and the polling client.
#[derive(Debug, Error)]
pub enum AvatarError {
    /// The expression name is not in the catalog.
    #[error("Unknown expression '{name}'")]
    UnknownExpression {
        name: String,
        /// Valid names in catalog order, for error payloads.
        available: Vec<String>,
    },

    /// Every action in a batch was invalid.
    #[error("No valid actions in batch")]
    NoValidActions,

    /// A batch action carried a non-positive duration.
    #[error("Invalid duration {duration} for expression '{expression}' (must be a positive integer of milliseconds)")]
    InvalidDuration { expression: String, duration: i64 },

    /// A request parameter could not be interpreted.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The display client could not reach the state store.
    #[error("State store unavailable: {0}")]
    TransportUnavailable(String),
}

impl AvatarError {
    /// Valid expression names attached to this error, if any.
    pub fn available_expressions(&self) -> Option<&[String]> {
        match self {
            AvatarError::UnknownExpression { available, .. } => Some(available),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AvatarError {
    fn from(err: reqwest::Error) -> Self {
        AvatarError::TransportUnavailable(err.to_string())
    }
}
