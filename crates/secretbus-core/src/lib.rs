//! # secretbus-core
//!
//! Core types, configuration, and utilities for SecretBus.
//!
//! This crate provides shared functionality used by the protocol crates:
//!
//! - **Configuration**: Loading, validation, and environment overrides
//! - **Secrets**: Zeroizing, redacted containers for plaintext secret material
//! - **Utilities**: Path resolution and environment handling

pub mod config;
pub mod env;
pub mod error;
pub mod paths;
pub mod secret;

// Re-exports for convenience
pub use config::{Config, SessionMode};
pub use error::{ConfigError, Error, Result};
pub use secret::{SecretBytes, SecretString};
