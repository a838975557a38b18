//! # Host Configuration
//!
//! All values have defaults and can be overridden from the environment.

use std::env;

use thiserror::Error;
use tracing::warn;

/// Module host configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Language of the initial service context.
    pub lang: String,
    /// Envelopes a loopback transport buffers before a slow hub lags.
    pub bus_capacity: usize,
    /// Modules to mount at startup, in order.
    pub modules: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            bus_capacity: hub_bus::DEFAULT_CHANNEL_CAPACITY,
            modules: Vec::new(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("HUB_LANG must not be empty")]
    EmptyLanguage,

    #[error("HUB_BUS_CAPACITY must be at least 1")]
    ZeroCapacity,
}

impl HostConfig {
    /// Load from environment variables.
    ///
    /// - `HUB_LANG`: context language (default: en)
    /// - `HUB_BUS_CAPACITY`: loopback buffer size (default: 1000)
    /// - `HUB_MODULES`: comma-separated modules to mount
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(lang) = lookup("HUB_LANG") {
            config.lang = lang.trim().to_string();
        }

        if let Some(capacity) = lookup("HUB_BUS_CAPACITY") {
            match capacity.trim().parse() {
                Ok(c) => config.bus_capacity = c,
                Err(_) => warn!(value = %capacity, "Ignoring invalid HUB_BUS_CAPACITY"),
            }
        }

        if let Some(modules) = lookup("HUB_MODULES") {
            config.modules = modules
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
        }

        config
    }

    /// Reject values the host cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lang.is_empty() {
            return Err(ConfigError::EmptyLanguage);
        }
        if self.bus_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}
