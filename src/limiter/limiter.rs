//! Limiter facade
//!
//! `RateLimiter` is the public surface: ask for admission, optionally block
//! until admitted, and report every outcome. Any number of tasks may share
//! one limiter, and any number of limiters (across processes and hosts) may
//! share one budget by pointing at the same Redis keys.

use crate::limiter::coordinator::Coordinator;
use crate::limiter::policy::RatePolicy;
use crate::limiter::status::RequestsStatus;
use crate::storage::redis::RedisPool;
use crate::utils::error::{LimiterError, Result};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Local snapshot of the shared state.
///
/// Authoritative only while one admission transaction is in flight; every
/// admission refreshes it from the store. Copied out under the mutex so the
/// lock is never held across an await point.
struct LimiterCache {
    status: RequestsStatus,
    policy: RatePolicy,
}

/// Distributed client-side rate limiter.
///
/// Controls how often requests may be made against one upstream quota. The
/// canonical window counters live in Redis; every limiter built with the
/// same host name shares them through optimistic transactions, so the fleet
/// as a whole stays under the published ratelimit.
///
/// Every admission (`can_make_request` returning `(true, 0)`, or
/// `wait_for_ratelimit` returning `Ok`) must be followed by exactly one of
/// [`request_successful`](Self::request_successful),
/// [`request_cancelled`](Self::request_cancelled), or
/// [`hit_rate_limit`](Self::hit_rate_limit) with the same weight. An
/// unpaired admission leaks pending budget and will eventually stall every
/// client on the host.
pub struct RateLimiter {
    coordinator: Coordinator,
    cache: Mutex<LimiterCache>,
    /// Weight admitted by this instance and not yet reported. Only used to
    /// catch caller contract violations in debug builds.
    outstanding: AtomicI64,
}

impl RateLimiter {
    /// Create a limiter for the policy's host, seeding the shared state in
    /// Redis if this is the first limiter on the budget.
    ///
    /// Seeding never overwrites: a limiter joining a running fleet adopts
    /// the stored counters and any tightened policy on its first admission.
    pub async fn new(policy: RatePolicy, pool: RedisPool) -> Result<Self> {
        let coordinator = Coordinator::new(pool, policy.host());
        coordinator.seed(&policy).await?;

        Ok(Self {
            coordinator,
            cache: Mutex::new(LimiterCache {
                status: RequestsStatus::default(),
                policy,
            }),
            outstanding: AtomicI64::new(0),
        })
    }

    /// Ask whether a request of the given weight may be made now.
    ///
    /// Returns `(true, 0)` when the request is admitted, or `(false, wait)`
    /// with the number of milliseconds to sleep before asking again. An
    /// admitted weight is counted as pending in the shared state until its
    /// outcome is reported.
    pub async fn can_make_request(&self, weight: i64) -> Result<(bool, i64)> {
        let (mut status, mut policy) = {
            let cache = self.cache.lock();
            (cache.status, cache.policy.clone())
        };

        let (allow, wait) = self
            .coordinator
            .try_admission(&mut status, &mut policy, weight)
            .await?;

        {
            let mut cache = self.cache.lock();
            cache.status = status;
            cache.policy = policy;
        }

        if allow {
            self.outstanding.fetch_add(weight, Ordering::Relaxed);
        }
        Ok((allow, wait))
    }

    /// Block until a request of the given weight is admitted.
    ///
    /// Loops [`can_make_request`](Self::can_make_request), sleeping the
    /// returned wait between attempts. The sleep is shortened by a few
    /// random milliseconds so that many clients parked on the same window
    /// do not all retry in the same instant. Cancelling the token ends the
    /// wait with [`LimiterError::Cancelled`] and no admission.
    pub async fn wait_for_ratelimit(&self, weight: i64, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(LimiterError::Cancelled);
            }

            let (allow, wait) = self.can_make_request(weight).await?;
            if allow {
                return Ok(());
            }

            let wait = apply_retry_jitter(wait);
            debug!(weight, wait_ms = wait, "request throttled, sleeping");

            tokio::select! {
                _ = cancel.cancelled() => return Err(LimiterError::Cancelled),
                _ = sleep(Duration::from_millis(wait as u64)) => {}
            }
        }
    }

    /// Report an admitted request that completed without a ratelimit
    /// response from the upstream.
    pub async fn request_successful(&self, weight: i64) -> Result<()> {
        self.note_reported(weight);
        self.coordinator.report_success(weight).await
    }

    /// Report an admitted request that was never actually sent.
    pub async fn request_cancelled(&self, weight: i64) -> Result<()> {
        self.note_reported(weight);
        self.coordinator.report_cancelled(weight).await
    }

    /// Report an admitted request the upstream rejected with a
    /// ratelimit-exceeded response.
    ///
    /// Tightens the shared policy by the request weight and stamps the
    /// cool-down marker so every client on the budget reloads the tighter
    /// policy. `wait` is any retry-after hint from the upstream, in
    /// milliseconds; pass 0 when there is none.
    pub async fn hit_rate_limit(&self, weight: i64, wait: i64) -> Result<()> {
        self.note_reported(weight);

        let mut policy = self.cache.lock().policy.clone();
        self.coordinator
            .report_rate_limit_hit(&mut policy, weight, wait)
            .await?;
        self.cache.lock().policy = policy;
        Ok(())
    }

    /// Snapshot of the locally cached window counters.
    ///
    /// Best effort: reflects the state as of this limiter's last admission
    /// attempt, without a store round-trip.
    pub fn status(&self) -> RequestsStatus {
        self.cache.lock().status
    }

    /// Snapshot of the locally cached effective policy.
    pub fn policy(&self) -> RatePolicy {
        self.cache.lock().policy.clone()
    }

    fn note_reported(&self, weight: i64) {
        let balance = self.outstanding.fetch_sub(weight, Ordering::Relaxed) - weight;
        debug_assert!(
            balance >= 0,
            "outcome reported without a matching admission (weight {weight}, balance {balance})"
        );
    }
}

/// Shorten a wait by a random 15-25ms so clients parked on the same window
/// end do not wake in lockstep. Never goes below zero.
fn apply_retry_jitter(wait: i64) -> i64 {
    if wait <= 0 {
        return 0;
    }
    let jitter = rand::thread_rng().gen_range(15..=25);
    (wait - jitter).max(0)
}
