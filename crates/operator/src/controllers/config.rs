//! Operator configuration
//!
//! Loaded from a mounted YAML file with validated defaults, so the operator
//! starts even when no config volume is present.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "/config/config.yaml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OperatorConfig {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    /// Path probed on each workload for the capability manifest, unless the
    /// workload overrides it via annotation
    #[serde(default = "default_well_known_path")]
    pub well_known_path: String,

    /// Re-check interval while a deployment is not yet fully available
    #[serde(default = "default_not_ready_requeue_seconds")]
    pub not_ready_requeue_seconds: u64,

    /// Per-call timeout for discovery HTTP requests
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Backoff applied by the discovery error policy around failed reconciles.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_retry_initial_seconds")]
    pub initial_interval_seconds: f64,
    #[serde(default = "default_retry_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
}

fn default_well_known_path() -> String {
    ".well-known/capabilities.json".to_string()
}

fn default_not_ready_requeue_seconds() -> u64 {
    10
}

fn default_request_timeout_seconds() -> u64 {
    10
}

fn default_retry_initial_seconds() -> f64 {
    5.0
}

fn default_retry_multiplier() -> f64 {
    1.5
}

fn default_retry_max_attempts() -> u32 {
    3
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            well_known_path: default_well_known_path(),
            not_ready_requeue_seconds: default_not_ready_requeue_seconds(),
            request_timeout_seconds: default_request_timeout_seconds(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            initial_interval_seconds: default_retry_initial_seconds(),
            multiplier: default_retry_multiplier(),
            max_attempts: default_retry_max_attempts(),
        }
    }
}

impl OperatorConfig {
    /// Loads configuration from a mounted file, falling back to defaults
    /// when the file is absent or unreadable.
    pub fn from_mounted_file(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_yaml::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Failed to parse config file {}: {}, using defaults", path, e);
                    OperatorConfig::default()
                }
            },
            Err(e) => {
                warn!("Config file {} not readable: {}, using defaults", path, e);
                OperatorConfig::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let discovery = &self.discovery;
        if discovery.well_known_path.trim().is_empty() {
            return Err("discovery.wellKnownPath must not be empty".to_string());
        }
        if discovery.not_ready_requeue_seconds == 0 {
            return Err("discovery.notReadyRequeueSeconds must be positive".to_string());
        }
        if discovery.retry.initial_interval_seconds <= 0.0 {
            return Err("discovery.retry.initialIntervalSeconds must be positive".to_string());
        }
        if discovery.retry.multiplier < 1.0 {
            return Err("discovery.retry.multiplier must be at least 1.0".to_string());
        }
        if discovery.retry.max_attempts == 0 {
            return Err("discovery.retry.maxAttempts must be at least 1".to_string());
        }
        Ok(())
    }
}

impl DiscoveryConfig {
    pub fn not_ready_requeue(&self) -> Duration {
        Duration::from_secs(self.not_ready_requeue_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}
