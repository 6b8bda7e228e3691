//! Optimistic transaction primitives
//!
//! WATCH/UNWATCH plus an atomic pipeline executor that distinguishes a
//! transaction aborted by a concurrent writer (EXEC returned nil) from a
//! transport failure.

use super::pool::RedisConnection;
use crate::utils::error::{LimiterError, Result};

impl RedisConnection {
    /// Start watching keys for the next EXEC on this connection.
    ///
    /// Must run on an exclusive connection; the watch set is
    /// per-connection state.
    pub async fn watch(&mut self, keys: &[&str]) -> Result<()> {
        let mut cmd = redis::cmd("WATCH");
        for key in keys {
            cmd.arg(*key);
        }
        let _: () = cmd
            .query_async(&mut self.conn)
            .await
            .map_err(LimiterError::Redis)?;
        Ok(())
    }

    /// Drop the watch set without running a transaction
    pub async fn unwatch(&mut self) -> Result<()> {
        let _: () = redis::cmd("UNWATCH")
            .query_async(&mut self.conn)
            .await
            .map_err(LimiterError::Redis)?;
        Ok(())
    }

    /// Run an atomic (MULTI/EXEC) pipeline.
    ///
    /// Returns `None` when EXEC replied nil, meaning a watched key changed
    /// since WATCH and the queued commands were discarded. Pipelines without
    /// a preceding WATCH always commit and return `Some`.
    pub async fn exec_atomic(&mut self, pipe: &redis::Pipeline) -> Result<Option<redis::Value>> {
        let response: Option<redis::Value> = pipe
            .query_async(&mut self.conn)
            .await
            .map_err(LimiterError::Redis)?;
        Ok(response)
    }
}
