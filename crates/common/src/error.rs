//! Error types for shotdiff

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using shotdiff Error
pub type Result<T> = std::result::Result<T, Error>;

/// shotdiff error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Raised when an accept request names a test that was never recorded as failing.
    #[error("No such test failed: {0}")]
    NotFound(String),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Test engine error: {0}")]
    Engine(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Path {path} is not inside {root}")]
    InvalidPath { path: PathBuf, root: PathBuf },
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl Error {
    /// Whether this error is the expected, user-facing validation failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
