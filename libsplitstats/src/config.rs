use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Duration;

use crate::counter::{validate_windows, MultiWindowCounter, STANDARD_WINDOWS};
use crate::StatsError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File access problem {0}")]
    File(#[from] std::io::Error),
    #[error("TOML parsing problem {0}")]
    TomlParsing(#[from] toml::de::Error),
    #[error("Invalid stats config: {0}")]
    Invalid(#[from] StatsError),
}

/// Settings for the counters and the events built from them. Every field has a
/// default, so an empty TOML file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StatsConfig {
    /// Environment tag stamped on every SplitCompletionEvent
    pub environment: String,
    /// Decay windows in milliseconds. Counters report them in this order
    pub window_ms: Vec<u64>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            environment: "dev".to_string(),
            window_ms: STANDARD_WINDOWS
                .iter()
                .map(|w| w.as_millis() as u64)
                .collect(),
        }
    }
}

impl StatsConfig {
    /// Parse the config from the given file or return an error
    pub fn from_toml_file(filename: impl AsRef<Path>) -> Result<StatsConfig, ConfigError> {
        let contents = std::fs::read_to_string(filename)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<StatsConfig, ConfigError> {
        let config: StatsConfig = toml::from_str(contents)?;
        validate_windows(&config.window_durations())?;
        Ok(config)
    }

    pub fn window_durations(&self) -> Vec<Duration> {
        self.window_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    /// A fresh counter tracking the configured windows
    pub fn new_counter(&self) -> Result<MultiWindowCounter, ConfigError> {
        Ok(MultiWindowCounter::new(self.window_durations())?)
    }
}
