//! Environment variable handling.

use std::env;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
pub fn get_var_or(name: &str, default: &str) -> String {
    get_var(name).unwrap_or_else(|| default.to_string())
}

/// Common environment variable names.
pub mod vars {
    /// SecretBus home directory override.
    pub const SECRETBUS_HOME: &str = "SECRETBUS_HOME";

    /// SecretBus config file override.
    pub const SECRETBUS_CONFIG: &str = "SECRETBUS_CONFIG";

    /// SecretBus log filter.
    pub const SECRETBUS_LOG: &str = "SECRETBUS_LOG";

    /// Session mode override (`plain` or `dh-ietf1024-sha256-aes128-cbc-pkcs7`).
    pub const SECRETBUS_SESSION_MODE: &str = "SECRETBUS_SESSION_MODE";

    /// Prompt timeout override, in seconds.
    pub const SECRETBUS_PROMPT_TIMEOUT: &str = "SECRETBUS_PROMPT_TIMEOUT";
}
