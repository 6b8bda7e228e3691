//! Redis storage implementation
//!
//! This module provides Redis connectivity for the limiter's coordination
//! protocol.
//!
//! ## Module Structure
//!
//! - `pool` - Connection pool, exclusive connections, and health checks
//! - `hash` - Hash read operations (HLEN, HGETALL)
//! - `transaction` - WATCH/UNWATCH and atomic MULTI/EXEC pipelines

mod hash;
mod pool;
mod transaction;

pub use pool::{RedisConnection, RedisPool};
