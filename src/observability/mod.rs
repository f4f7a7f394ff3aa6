//! Observability for Halyard
//!
//! Structured logging through `tracing`. Subsystems log with an
//! UPPER_SNAKE `event` field and correlation ids as structured fields:
//!
//! ```ignore
//! info!(event = "CHANGE_SET_APPLIED", change_set_id = %id, rows = 3);
//! ```
//!
//! `RUST_LOG` overrides the configured level when set.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    /// One JSON object per line instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            Ok(())
        } else {
            Err(format!(
                "Invalid logging.level: '{}'. Must be one of {}.",
                self.level,
                LEVELS.join(", ")
            ))
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.to_ascii_lowercase()))
    }
}

/// Installs the global subscriber. Returns `false` when one was already
/// installed, which leaves the existing subscriber in place.
pub fn init(config: &LoggingConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_validation() {
        assert!(LoggingConfig::default().validate().is_ok());
        let upper = LoggingConfig {
            level: "WARN".into(),
            json: false,
        };
        assert!(upper.validate().is_ok());
        let bad = LoggingConfig {
            level: "loud".into(),
            json: false,
        };
        assert!(bad.validate().unwrap_err().contains("loud"));
    }

    #[test]
    fn test_init_twice_keeps_first() {
        let config = LoggingConfig::default();
        let _ = init(&config);
        assert!(!init(&config));
    }
}
