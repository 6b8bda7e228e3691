//! Configuration management for the limiter
//!
//! This module handles loading and validation of the Redis connection
//! settings and the declared upstream quotas.

pub mod models;
pub mod validation;

pub use models::{QuotaConfig, RedisConfig};
pub use validation::Validate;

use crate::utils::error::{LimiterError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Main configuration struct for the limiter
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Coordination store connection
    #[serde(default)]
    pub redis: RedisConfig,
    /// Declared upstream quotas, one per host
    #[serde(default)]
    pub quotas: Vec<QuotaConfig>,
}

impl Config {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {:?}", path);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LimiterError::Config(format!("Failed to read config file: {e}")))?;

        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| LimiterError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Look up the declared quota for a host
    pub fn quota(&self, host: &str) -> Option<&QuotaConfig> {
        self.quotas.iter().find(|quota| quota.host == host)
    }

    /// Merge with another configuration (other takes precedence)
    pub fn merge(mut self, other: Self) -> Self {
        self.redis = self.redis.merge(other.redis);
        if !other.quotas.is_empty() {
            self.quotas = other.quotas;
        }
        self
    }
}
