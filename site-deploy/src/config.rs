//! Configuration management for site deploys.
//!
//! Loads configuration from a TOML file. Every section and key is optional and
//! falls back to its default.

use crate::utils::{DeployError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub deploy: DeployConfig,
    pub retry: RetryConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the deploy API
    pub url: String,

    /// Personal access token
    pub token: String,

    /// Attempts per request while the API answers 429
    pub rate_limit_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Largest file count deployed synchronously
    pub sync_file_limit: usize,

    /// Maximum concurrent uploads
    pub upload_limit: usize,

    /// Deadline for asynchronous preprocessing (seconds)
    pub preprocessing_timeout_secs: u64,

    /// Delay between status polls (milliseconds)
    pub poll_interval_ms: u64,

    /// Extra delay after a failed status poll (milliseconds)
    pub poll_retry_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// First backoff interval (milliseconds)
    pub initial_interval_ms: u64,

    /// Growth factor between intervals
    pub multiplier: f64,

    /// Ceiling for a single interval (milliseconds)
    pub max_interval_ms: u64,

    /// Total retry budget per file (seconds)
    pub max_elapsed_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "https://api.netlify.com/api/v1".to_string(),
            token: String::new(),
            rate_limit_attempts: 3,
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            sync_file_limit: 7000,
            upload_limit: 10,
            preprocessing_timeout_secs: 5 * 60,
            poll_interval_ms: 2000,
            poll_retry_delay_ms: 3000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 500,
            multiplier: 1.5,
            max_interval_ms: 60_000,
            max_elapsed_secs: 2 * 60,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }
}

impl std::str::FromStr for Config {
    type Err = DeployError;

    fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DeployError::Config(e.to_string()))
    }
}
