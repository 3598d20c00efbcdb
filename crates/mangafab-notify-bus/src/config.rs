// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mangafab.dev

//! Notification bus configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Notification bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// UDP listener address (default: 0.0.0.0:7600)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// HTTP admin listener address (default: 127.0.0.1:7601)
    #[serde(default = "default_admin_addr")]
    pub admin_addr: String,

    /// Seconds without a heartbeat before an endpoint is evicted
    #[serde(default = "default_eviction")]
    pub eviction_secs: u64,

    /// Sweep interval for the eviction task
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:7600".to_string()
}

fn default_admin_addr() -> String {
    "127.0.0.1:7601".to_string()
}

fn default_eviction() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    5
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            admin_addr: default_admin_addr(),
            eviction_secs: default_eviction(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl NotifyConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn eviction_window(&self) -> Duration {
        Duration::from_secs(self.eviction_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
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
        if self.eviction_secs == 0 {
            return Err(ConfigError::Invalid("eviction_secs cannot be 0".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_secs cannot be 0".into(),
            ));
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
