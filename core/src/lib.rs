//! Depot Core - Foundational Types
//!
//! Error taxonomy, configuration and security-policy flags shared by the
//! depot runtime and CLI.

pub mod config;
pub mod error;
pub mod security;

// Re-export commonly used types
pub use config::{DepotConfig, LogLevel};
pub use error::{DepotError, Result};
pub use security::InsecureOptions;

/// Depot version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
