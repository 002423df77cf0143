//! # glreplay Common
//!
//! Error types and logging configuration shared by the glreplay crates.
//!
//! ## Features
//!
//! - Unified error type with categories and a fatal check
//! - Logging configuration and setup

use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for glreplay.
#[derive(Error, Debug)]
pub enum GlReplayError {
    /// Resource registry errors.
    #[error("Registry error: {message}")]
    Registry {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Batch or command decoding errors.
    #[error("Command error: {message}")]
    Command {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GlReplayError {
    /// Create a registry error.
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
            source: None,
        }
    }

    /// Create a registry error with source.
    pub fn registry_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Registry {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a command error with source.
    pub fn command_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Command {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Whether this error leaves a viewer unable to continue.
    ///
    /// Fatal errors switch the viewer into degraded mode; everything else
    /// only affects the batch or command that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GlReplayError::Registry { .. })
    }

    /// Get the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            GlReplayError::Registry { .. } => "registry",
            GlReplayError::Command { .. } => "command",
            GlReplayError::Config { .. } => "config",
            GlReplayError::Io(_) => "io",
            GlReplayError::Json(_) => "json",
        }
    }
}

/// Result type alias for glreplay operations.
pub type Result<T> = std::result::Result<T, GlReplayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(GlReplayError::registry("desync").category(), "registry");
        assert_eq!(GlReplayError::config("zero width").category(), "config");
        let err: GlReplayError = std::io::Error::other("gone").into();
        assert_eq!(err.category(), "io");
    }

    #[test]
    fn test_fatal() {
        assert!(GlReplayError::registry("desync").is_fatal());
        assert!(!GlReplayError::config("zero width").is_fatal());
        let err = GlReplayError::command_with_source("bad dtype", std::fmt::Error);
        assert!(!err.is_fatal());
        assert_eq!(err.category(), "command");
    }

    #[test]
    fn test_source_is_kept() {
        use std::error::Error as _;
        let err = GlReplayError::registry_with_source("resource registry", std::fmt::Error);
        assert_eq!(err.to_string(), "Registry error: resource registry");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_json_conversion() {
        let err: GlReplayError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.category(), "json");
    }
}
