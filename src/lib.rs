//! # rategate
//!
//! A distributed client-side rate limiter. Any number of worker processes,
//! on any number of hosts, share one logical budget against a third-party
//! API quota by coordinating through Redis optimistic transactions
//! (WATCH/MULTI/EXEC).
//!
//! ## Features
//!
//! - **Two-rate reduction**: a published sustained + burst quota folds into
//!   the single slower effective rate, with minimum spacing so admitted
//!   requests do not cluster at the window start
//! - **Shared budget**: the window counters live in Redis; every limiter
//!   built with the same host name draws from the same allowance
//! - **Optimistic coordination**: no central lock; concurrent admissions
//!   race through WATCH/MULTI/EXEC and losers retry or back off
//! - **Adaptive tightening**: a reported ratelimit-exceeded response
//!   shrinks the shared allowance so the fleet stops hammering the
//!   endpoint
//! - **Weighted requests**: a request that counts for more than one slot of
//!   the quota is admitted and reported with its weight
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rategate::{RateLimiter, RatePolicy, RedisConfig, RedisPool};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = RedisPool::new(&RedisConfig::default()).await?;
//!
//!     // sustained 1200 requests / 60s, burst 20 requests / 1s
//!     let policy = RatePolicy::new("api.example.com", 1200, 60, 20, 1);
//!     let limiter = RateLimiter::new(policy, pool).await?;
//!
//!     let cancel = CancellationToken::new();
//!     limiter.wait_for_ratelimit(1, &cancel).await?;
//!
//!     // ... make the outbound call ...
//!
//!     // every admission must be paired with exactly one outcome report
//!     limiter.request_successful(1).await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod limiter;
pub mod storage;
pub mod utils;

// Re-export main types
pub use config::{Config, QuotaConfig, RedisConfig};
pub use limiter::{RateLimiter, RatePolicy, RequestsStatus};
pub use storage::redis::RedisPool;
pub use utils::error::{LimiterError, Result};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");
