//! Configuration loading and persistence.

use super::{Config, SessionMode, MAX_PROMPT_TIMEOUT_SECS};
use crate::env::{get_var, vars};
use crate::error::ConfigError;
use crate::paths;
use std::fs;
use std::path::Path;
use tracing::debug;

impl Config {
    /// Load configuration from the default path, falling back to defaults
    /// when no file exists. Environment overrides are applied afterwards.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        let mut config = match Self::load(&path) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => {
                debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 doesn't have a serializer, so we use serde_json with pretty print
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Override settings from `SECRETBUS_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(mode) = get_var(vars::SECRETBUS_SESSION_MODE) {
            self.session.mode = mode
                .parse::<SessionMode>()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: vars::SECRETBUS_SESSION_MODE.to_string(),
                    value: mode.clone(),
                })?;
        }

        if let Some(timeout) = get_var(vars::SECRETBUS_PROMPT_TIMEOUT) {
            self.prompt.timeout_secs =
                timeout.parse().map_err(|_| ConfigError::InvalidEnv {
                    var: vars::SECRETBUS_PROMPT_TIMEOUT.to_string(),
                    value: timeout.clone(),
                })?;
        }

        Ok(())
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.service.bus_name.trim().is_empty() {
            errors.push("Service bus_name must not be empty".to_string());
        }

        for (field, path) in [
            ("object_path", &self.service.object_path),
            ("default_collection", &self.service.default_collection),
        ] {
            if !path.starts_with('/') {
                errors.push(format!(
                    "Service {} '{}' must be an absolute object path",
                    field, path
                ));
            }
        }

        if self.prompt.timeout_secs == 0 {
            errors.push("Prompt timeout_secs must be greater than 0".to_string());
        } else if self.prompt.timeout_secs > MAX_PROMPT_TIMEOUT_SECS {
            errors.push(format!(
                "Prompt timeout_secs must be at most {MAX_PROMPT_TIMEOUT_SECS}"
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_json5() {
        let config = Config::parse(
            r#"{
                // comments are allowed
                session: { mode: "plain" },
                prompt: { timeout_secs: 10 },
            }"#,
        )
        .unwrap();
        assert_eq!(config.session.mode, SessionMode::Plain);
        assert_eq!(config.prompt.timeout_secs, 10);
        assert_eq!(config.prompt.window_id, "Keyring Prompt");
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("secretbus.json5");

        let mut config = Config::default();
        config.prompt.timeout_secs = 90;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.prompt.timeout_secs, 90);
        assert_eq!(loaded.session.mode, config.session.mode);
    }

    #[test]
    fn test_load_missing() {
        let result = Config::load(Path::new("/nonexistent/secretbus.json5"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.service.bus_name = " ".to_string();
        config.service.default_collection = "relative/path".to_string();
        config.prompt.timeout_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("bus_name"));
        assert!(err.contains("default_collection"));
        assert!(err.contains("timeout_secs"));
    }

    #[test]
    fn test_validate_bounds_timeout() {
        let mut config = Config::default();
        config.prompt.timeout_secs = u64::MAX;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("at most"));

        config.prompt.timeout_secs = MAX_PROMPT_TIMEOUT_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }
}
