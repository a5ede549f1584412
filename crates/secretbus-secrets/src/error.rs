//! Error types for the secret transport protocol.

use std::time::Duration;

use thiserror::Error;

use crate::transport::{BusError, ObjectPath};
use crate::types::names::ERROR_NO_SUCH_OBJECT;

/// Errors that can occur while talking to the secret service.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The peer's DH public value is not in `(1, p - 1)`.
    #[error("DH public value out of range")]
    OutOfRange,

    #[error("Session error during {stage}: {reason}")]
    Session { stage: &'static str, reason: String },

    #[error("Invalid PKCS#7 padding: {0}")]
    Padding(&'static str),

    #[error("Prompt {0} was dismissed")]
    PromptDismissed(ObjectPath),

    #[error("Prompt {prompt} timed out after {after:?}")]
    PromptTimeout { prompt: ObjectPath, after: Duration },

    #[error("Transport error in {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: BusError,
    },

    #[error("Duplicate item: {0}")]
    DuplicateItem(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Malformed reply to {operation}: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] secretbus_core::ConfigError),
}

impl SecretError {
    /// Wrap a bus failure with the operation that issued the call.
    ///
    /// Missing objects are reported as [`SecretError::NotFound`] so callers
    /// can tell them apart from transport breakage.
    pub fn from_bus(operation: &'static str, source: BusError) -> Self {
        match source {
            BusError::Remote { ref name, ref message } if name == ERROR_NO_SUCH_OBJECT => {
                Self::NotFound(message.clone())
            }
            source => Self::Transport { operation, source },
        }
    }

    /// Negotiation failure at a named stage.
    pub fn session(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Session {
            stage,
            reason: reason.into(),
        }
    }

    /// Whether this is an expected prompt outcome rather than a failure of
    /// the transport or the protocol.
    pub fn is_prompt_outcome(&self) -> bool {
        matches!(self, Self::PromptDismissed(_) | Self::PromptTimeout { .. })
    }
}

/// Convenience result alias for secret operations.
pub type Result<T> = std::result::Result<T, SecretError>;
