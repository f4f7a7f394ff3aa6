//! Configuration
//!
//! One JSON file with a section per subsystem. Every field has a default,
//! so `{}` is a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::EventsConfig;
use crate::graph::ResolverConfig;
use crate::observability::LoggingConfig;
use crate::reconcile::ReconcileConfig;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        "HALYARD_CONFIG_ERROR"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalyardConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

impl HalyardConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: HalyardConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.logging.validate().map_err(ConfigError::Invalid)?;

        if self.events.channel_capacity == 0 {
            return Err(ConfigError::Invalid("events.channel_capacity must be > 0".into()));
        }
        if self.events.log_capacity == 0 {
            return Err(ConfigError::Invalid("events.log_capacity must be > 0".into()));
        }
        if self.resolver.max_concurrent_invocations == 0 {
            return Err(ConfigError::Invalid(
                "resolver.max_concurrent_invocations must be > 0".into(),
            ));
        }
        if self.resolver.function_timeout_ms == 0 {
            return Err(ConfigError::Invalid("resolver.function_timeout_ms must be > 0".into()));
        }
        if self.reconcile.max_concurrent_calls == 0 {
            return Err(ConfigError::Invalid(
                "reconcile.max_concurrent_calls must be > 0".into(),
            ));
        }
        if self.reconcile.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid("reconcile.call_timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = HalyardConfig::from_json("{}").unwrap();
        assert_eq!(config, HalyardConfig::default());
        assert_eq!(config.events.channel_capacity, 256);
        assert_eq!(config.resolver.max_concurrent_invocations, 8);
        assert_eq!(config.reconcile.call_timeout_ms, 60_000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"logging":{{"level":"debug","json":true}},"reconcile":{{"max_concurrent_calls":2}}}}"#
        )
        .unwrap();
        let config = HalyardConfig::load(file.path()).unwrap();
        assert!(config.logging.json);
        assert_eq!(config.reconcile.max_concurrent_calls, 2);
        assert_eq!(config.reconcile.call_timeout_ms, 60_000);
    }

    #[test]
    fn test_rejects_zero_limits() {
        let err = HalyardConfig::from_json(r#"{"resolver":{"max_concurrent_invocations":0}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = HalyardConfig::load(Path::new("/nonexistent/halyard.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert_eq!(err.code(), "HALYARD_CONFIG_ERROR");
    }
}
