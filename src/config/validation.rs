//! Configuration validation
//!
//! This module provides validation logic for all configuration structures.

use super::models::{QuotaConfig, RedisConfig};
use crate::utils::error::{LimiterError, Result};
use std::collections::HashSet;
use tracing::debug;

/// Validation trait for configuration structures
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

impl Validate for RedisConfig {
    fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(LimiterError::Config(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        let parsed = url::Url::parse(&self.url)
            .map_err(|e| LimiterError::Config(format!("Invalid Redis URL: {e}")))?;
        if parsed.scheme() != "redis" && parsed.scheme() != "rediss" {
            return Err(LimiterError::Config(format!(
                "Redis URL must use the redis:// or rediss:// scheme, got {}",
                parsed.scheme()
            )));
        }

        if self.max_connections == 0 {
            return Err(LimiterError::Config(
                "Redis max connections must be greater than 0".to_string(),
            ));
        }

        if self.connection_timeout == 0 {
            return Err(LimiterError::Config(
                "Redis connection timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Validate for QuotaConfig {
    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(LimiterError::Config(
                "Quota host cannot be empty".to_string(),
            ));
        }

        for value in [
            self.sustained_limit,
            self.sustained_period_secs,
            self.burst_limit,
            self.burst_period_secs,
        ] {
            if value < 0 {
                return Err(LimiterError::Config(format!(
                    "Quota rates for {} cannot be negative",
                    self.host
                )));
            }
        }

        Ok(())
    }
}

impl Validate for super::Config {
    fn validate(&self) -> Result<()> {
        debug!("Validating limiter configuration");

        self.redis.validate()?;

        // Two quotas on one host would race each other's seeds
        let mut hosts = HashSet::new();
        for quota in &self.quotas {
            quota.validate()?;
            if !hosts.insert(&quota.host) {
                return Err(LimiterError::Config(format!(
                    "Duplicate quota host: {}",
                    quota.host
                )));
            }
        }

        debug!("Limiter configuration validation completed");
        Ok(())
    }
}
