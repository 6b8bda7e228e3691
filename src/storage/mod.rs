//! Storage backends
//!
//! The only storage backend is Redis, which holds the canonical copy of the
//! shared window counters and the effective rate policy.

pub mod redis;

pub use redis::{RedisConnection, RedisPool};
