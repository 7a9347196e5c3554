//! shotdiff common library
//!
//! Shared types, configuration, and the error taxonomy for the shotdiff
//! review tool.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{EngineConfig, ReviewConfig};
pub use error::{Error, Result};
pub use types::*;

/// shotdiff version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
