//! Redis Hash read operations
//!
//! This module provides the hash reads the coordinator performs between
//! WATCH and MULTI: field counting for the seed probe and full-hash loads
//! for the status and policy records.

use super::pool::RedisConnection;
use crate::utils::error::{LimiterError, Result};
use redis::AsyncCommands;
use std::collections::HashMap;

impl RedisConnection {
    /// Number of fields stored in a hash (0 when the key is absent)
    pub async fn hash_len(&mut self, key: &str) -> Result<usize> {
        let len: usize = self.conn.hlen(key).await.map_err(LimiterError::Redis)?;
        Ok(len)
    }

    /// Get all hash fields and values
    pub async fn hash_get_all(&mut self, key: &str) -> Result<HashMap<String, String>> {
        let hash: HashMap<String, String> =
            self.conn.hgetall(key).await.map_err(LimiterError::Redis)?;
        Ok(hash)
    }
}
