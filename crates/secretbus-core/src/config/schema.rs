//! Configuration schema definitions.

use crate::env::{get_var_or, vars};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Well-known bus name of the secret service daemon.
pub const DEFAULT_BUS_NAME: &str = "org.freedesktop.secrets";

/// Object path of the service object.
pub const DEFAULT_SERVICE_PATH: &str = "/org/freedesktop/secrets";

/// Alias path of the default collection.
pub const DEFAULT_COLLECTION: &str = "/org/freedesktop/secrets/aliases/default";

/// Seconds to wait for a prompt to complete.
pub const DEFAULT_PROMPT_TIMEOUT_SECS: u64 = 30;

/// Longest prompt wait accepted from configuration (one day).
pub const MAX_PROMPT_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Purpose string shown alongside an interactive prompt.
pub const DEFAULT_PROMPT_WINDOW_ID: &str = "Keyring Prompt";

/// Main SecretBus configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon addressing.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Session negotiation.
    #[serde(default)]
    pub session: SessionConfig,

    /// Prompt handling.
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where to find the secret service on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Well-known bus name.
    #[serde(default = "default_bus_name")]
    pub bus_name: String,

    /// Service object path.
    #[serde(default = "default_object_path")]
    pub object_path: String,

    /// Collection used when none is given explicitly.
    #[serde(default = "default_collection")]
    pub default_collection: String,
}

fn default_bus_name() -> String {
    DEFAULT_BUS_NAME.to_string()
}

fn default_object_path() -> String {
    DEFAULT_SERVICE_PATH.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bus_name: default_bus_name(),
            object_path: default_object_path(),
            default_collection: default_collection(),
        }
    }
}

/// Session negotiation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Transport mode for secret payloads.
    #[serde(default)]
    pub mode: SessionMode,
}

/// How secret payloads travel over the bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionMode {
    /// Secrets are sent unencrypted.
    #[serde(rename = "plain")]
    Plain,

    /// Secrets are sealed with AES-128-CBC under a key agreed via DH.
    #[default]
    #[serde(rename = "dh-ietf1024-sha256-aes128-cbc-pkcs7")]
    DhEncrypted,
}

impl SessionMode {
    /// Algorithm name sent to the daemon when opening a session.
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::DhEncrypted => "dh-ietf1024-sha256-aes128-cbc-pkcs7",
        }
    }

    /// Whether payloads are encrypted in this mode.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::DhEncrypted)
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.algorithm())
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "dh" | "dh-ietf1024-sha256-aes128-cbc-pkcs7" => Ok(Self::DhEncrypted),
            other => Err(format!("unknown session mode '{other}'")),
        }
    }
}

/// Prompt handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// How long to wait for a prompt to complete.
    #[serde(default = "default_prompt_timeout")]
    pub timeout_secs: u64,

    /// Purpose string passed when starting the prompt.
    #[serde(default = "default_window_id")]
    pub window_id: String,
}

fn default_prompt_timeout() -> u64 {
    DEFAULT_PROMPT_TIMEOUT_SECS
}

fn default_window_id() -> String {
    DEFAULT_PROMPT_WINDOW_ID.to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_prompt_timeout(),
            window_id: default_window_id(),
        }
    }
}

impl PromptConfig {
    /// Prompt timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level filter.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    /// Filter directive: `SECRETBUS_LOG` when set, otherwise `level`.
    pub fn filter(&self) -> String {
        get_var_or(vars::SECRETBUS_LOG, &self.level)
    }
}
