//! Distributed rate limiting
//!
//! ## Module Structure
//!
//! - `policy` - Effective rate policy and the two-rate reducer
//! - `status` - Shared window counters and the pure admission algorithm
//! - `coordinator` - Optimistic read-modify-write against the Redis store
//! - `limiter` - The public `RateLimiter` facade

mod coordinator;
mod limiter;
mod policy;
mod status;

pub use limiter::RateLimiter;
pub use policy::RatePolicy;
pub use status::RequestsStatus;
