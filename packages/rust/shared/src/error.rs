//! Error types for energyqa.
//!
//! Library crates use [`EnergyQaError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all energyqa operations.
#[derive(Debug, thiserror::Error)]
pub enum EnergyQaError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Material or payload parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Failure inside the embedding/scoring service.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Retrieval could not produce a ranking for the query.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (out-of-range option, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EnergyQaError>;

impl EnergyQaError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = EnergyQaError::config("min_score out of range");
        assert_eq!(err.to_string(), "config error: min_score out of range");

        let err = EnergyQaError::Retrieval("scorer offline".into());
        assert_eq!(err.to_string(), "retrieval error: scorer offline");

        let err = EnergyQaError::validation("top_k must be positive");
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn io_error_keeps_path() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = EnergyQaError::io("/tmp/material.json", source);
        assert!(err.to_string().contains("/tmp/material.json"));
    }
}
