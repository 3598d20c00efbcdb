// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Progress bus configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Progress bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Data listener address (default: 0.0.0.0:7500)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// HTTP admin listener address (default: 127.0.0.1:7501)
    #[serde(default = "default_admin_addr")]
    pub admin_addr: String,

    /// Seconds a subscription may stay silent before it is reaped
    #[serde(default = "default_read_deadline")]
    pub read_deadline_secs: u64,

    /// Per-receiver queue depth; lagging receivers lose the oldest frames
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum queued frames flushed after DISCONNECT before closing
    #[serde(default = "default_drain_budget")]
    pub drain_budget: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:7500".to_string()
}

fn default_admin_addr() -> String {
    "127.0.0.1:7501".to_string()
}

fn default_read_deadline() -> u64 {
    90
}

fn default_queue_capacity() -> usize {
    100
}

fn default_drain_budget() -> usize {
    32
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            admin_addr: default_admin_addr(),
            read_deadline_secs: default_read_deadline(),
            queue_capacity: default_queue_capacity(),
            drain_budget: default_drain_budget(),
        }
    }
}

impl BusConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.read_deadline_secs)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "bind_addr '{}' is not a socket address",
                self.bind_addr
            )));
        }
        if self.admin_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "admin_addr '{}' is not a socket address",
                self.admin_addr
            )));
        }
        if self.read_deadline_secs == 0 {
            return Err(ConfigError::Invalid(
                "read_deadline_secs cannot be 0".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity cannot be 0".into()));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid value: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = BusConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.read_deadline(), Duration::from_secs(90));
    }

    #[test]
    fn test_bad_addr_rejected() {
        let config = BusConfig {
            bind_addr: "not-an-addr".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let config = BusConfig {
            read_deadline_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bus.json");
        std::fs::write(&path, r#"{"bind_addr": "127.0.0.1:9100"}"#).unwrap();

        let config = BusConfig::from_file(&path).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9100");
        assert_eq!(config.read_deadline_secs, 90);
    }
}
