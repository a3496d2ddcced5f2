//! RegTrust Core - Foundational Types
//!
//! This crate provides the error taxonomy and configuration model shared
//! by the certificate fallback library and the `regtrust` CLI.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{Environment, FallbackConfig};
pub use error::{Result, TrustError};

/// RegTrust version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
