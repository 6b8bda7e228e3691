//! Configuration data models

use crate::limiter::RatePolicy;
use serde::{Deserialize, Serialize};

/// Default Redis connection timeout in seconds
pub fn default_connection_timeout() -> u64 {
    5
}

/// Default cap on concurrently open exclusive connections
pub fn default_max_connections() -> u32 {
    20
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedisConfig {
    /// Redis URL
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Maximum connections open against the store at once
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            max_connections: default_max_connections(),
            connection_timeout: default_connection_timeout(),
        }
    }
}

impl RedisConfig {
    /// Merge Redis configurations (other takes precedence)
    pub fn merge(mut self, other: Self) -> Self {
        if !other.url.is_empty() && other.url != default_redis_url() {
            self.url = other.url;
        }
        if other.max_connections != default_max_connections() {
            self.max_connections = other.max_connections;
        }
        if other.connection_timeout != default_connection_timeout() {
            self.connection_timeout = other.connection_timeout;
        }
        self
    }
}

/// A published upstream quota: a sustained rate plus a burst rate.
///
/// Both time periods are in seconds. A rate with a zero limit or period is
/// unconstrained. An API that publishes only one rate is declared with the
/// same rate in both slots.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct QuotaConfig {
    /// Upstream host the quota applies to; names the shared Redis keys
    pub host: String,
    /// Sustained requests allowed per sustained period
    #[serde(default)]
    pub sustained_limit: i64,
    /// Sustained period length in seconds
    #[serde(default)]
    pub sustained_period_secs: i64,
    /// Burst requests allowed per burst period
    #[serde(default)]
    pub burst_limit: i64,
    /// Burst period length in seconds
    #[serde(default)]
    pub burst_period_secs: i64,
}

impl QuotaConfig {
    /// Reduce the declared quota to the effective rate policy
    pub fn to_policy(&self) -> RatePolicy {
        RatePolicy::new(
            self.host.clone(),
            self.sustained_limit,
            self.sustained_period_secs,
            self.burst_limit,
            self.burst_period_secs,
        )
    }
}
