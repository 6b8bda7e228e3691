//! Optimistic coordination against the Redis store
//!
//! Every mutation of the shared state goes through here. Admission is a
//! read-decide-write cycle guarded by WATCH: the status and policy hashes
//! are watched, loaded into the local cache, the pure admission decision
//! runs, and the updated counters are written back inside MULTI/EXEC. A nil
//! EXEC reply means another client committed first; the cycle retries only
//! when the decision carried no wait, otherwise the abort is converted into
//! a deny so the caller's sleep spreads the retries out.
//!
//! Outcome reporting never needs to be optimistic: it only moves absolute
//! counter deltas (HINCRBY), which commute with concurrent admissions.

use crate::limiter::policy::RatePolicy;
use crate::limiter::status::RequestsStatus;
use crate::storage::redis::{RedisConnection, RedisPool};
use crate::utils::error::Result;
use crate::utils::time::unix_time_ms;
use std::collections::HashMap;
use tracing::{debug, info, warn};

// Hash field names shared by every client on the budget. The wire names are
// part of the coordination contract and never change with the Rust naming.
const FIELD_REQUESTS: &str = "requests";
const FIELD_PENDING_REQUESTS: &str = "pendingRequests";
const FIELD_FIRST_REQUEST: &str = "firstRequest";
const FIELD_LAST_ERROR: &str = "lasterror";

const FIELD_LIMIT: &str = "limit";
const FIELD_TIME_PERIOD: &str = "timePeriod";
const FIELD_TIME_BETWEEN: &str = "timeBetween";

const STATUS_FIELD_COUNT: usize = 4;
const CONFIG_FIELD_COUNT: usize = 3;

/// Read-modify-write access to one host's `status:` and `config:` hashes.
pub(crate) struct Coordinator {
    pool: RedisPool,
    status_key: String,
    config_key: String,
}

impl Coordinator {
    pub(crate) fn new(pool: RedisPool, host: &str) -> Self {
        Self {
            pool,
            status_key: status_key(host),
            config_key: config_key(host),
        }
    }

    /// Seed whichever of the status and config hashes do not exist yet.
    ///
    /// The status seeds with `lasterror = 1` so that every fresh client,
    /// whose local cache starts at 0, reloads the policy from the store on
    /// its first admission. Existing values are never overwritten; a
    /// limiter joining a running fleet adopts whatever tightened policy is
    /// already in place.
    pub(crate) async fn seed(&self, policy: &RatePolicy) -> Result<()> {
        let mut conn = self.pool.get_connection().await?;

        let status_exists = conn.hash_len(&self.status_key).await? > 0;
        let config_exists = conn.hash_len(&self.config_key).await? > 0;
        if status_exists && config_exists {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();

        if !status_exists {
            pipe.hset_multiple(
                &self.status_key,
                &[
                    (FIELD_REQUESTS, "0".to_string()),
                    (FIELD_PENDING_REQUESTS, "0".to_string()),
                    (FIELD_FIRST_REQUEST, "0".to_string()),
                    (FIELD_LAST_ERROR, "1".to_string()),
                ],
            );
        }

        if !config_exists {
            pipe.hset_multiple(&self.config_key, &policy_fields(policy));
        }

        conn.exec_atomic(&pipe).await?;
        info!(
            status_key = %self.status_key,
            config_key = %self.config_key,
            "seeded shared ratelimit state"
        );
        Ok(())
    }

    /// One full optimistic admission cycle.
    ///
    /// `status` and `policy` are the caller's private copies of the local
    /// cache; they are refreshed from the store and, on an admitted
    /// request, reflect exactly what was committed.
    pub(crate) async fn try_admission(
        &self,
        status: &mut RequestsStatus,
        policy: &mut RatePolicy,
        weight: i64,
    ) -> Result<(bool, i64)> {
        let mut conn = self.pool.exclusive_connection().await?;

        loop {
            conn.watch(&[self.status_key.as_str(), self.config_key.as_str()])
                .await?;

            let last_error_prev = status.last_error_time();
            if let Some(stored) = self.read_status(&mut conn).await? {
                *status = stored;
            }

            // Version-epoch check: the policy is re-read only when some
            // client has recorded a ratelimit hit since we last looked.
            if status.last_error_time() != last_error_prev {
                if let Some((limit, period, time_between)) = self.read_policy(&mut conn).await? {
                    policy.apply_store_fields(limit, period, time_between);
                    debug!(
                        host = policy.host(),
                        limit, period, time_between, "reloaded policy from store"
                    );
                }
            }

            let now = unix_time_ms();
            let (allow, wait) = status.admission_decision(weight, policy, now);

            if !allow {
                conn.unwatch().await?;
                return Ok((false, wait));
            }

            let mut pipe = redis::pipe();
            pipe.atomic().hset_multiple(
                &self.status_key,
                &[
                    (FIELD_REQUESTS, status.requests().to_string()),
                    (FIELD_PENDING_REQUESTS, status.pending_requests().to_string()),
                    (FIELD_FIRST_REQUEST, status.first_request().to_string()),
                    (FIELD_LAST_ERROR, status.last_error_time().to_string()),
                ],
            );

            if conn.exec_atomic(&pipe).await?.is_some() {
                return Ok((true, 0));
            }

            // A concurrent writer bumped a watched key between WATCH and
            // EXEC. Retrying immediately is only worthwhile when the
            // decision carried no wait; otherwise hand the wait back and
            // let the caller's sleep amortise the contention.
            if wait != 0 {
                return Ok((false, wait));
            }
            debug!(
                status_key = %self.status_key,
                "admission transaction aborted by concurrent writer, retrying"
            );
        }
    }

    /// Report a completed request: its weight moves from pending to
    /// counted.
    pub(crate) async fn report_success(&self, weight: i64) -> Result<()> {
        let mut conn = self.pool.get_connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hincr(&self.status_key, FIELD_REQUESTS, weight)
            .hincr(&self.status_key, FIELD_PENDING_REQUESTS, -weight);
        conn.exec_atomic(&pipe).await?;
        Ok(())
    }

    /// Report a request that was admitted but never sent: its pending
    /// weight is released without being counted.
    pub(crate) async fn report_cancelled(&self, weight: i64) -> Result<()> {
        let mut conn = self.pool.get_connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hincr(&self.status_key, FIELD_PENDING_REQUESTS, -weight);
        conn.exec_atomic(&pipe).await?;
        Ok(())
    }

    /// Report a request the upstream rejected for exceeding its ratelimit.
    ///
    /// In one transaction: the request is counted like a success, the
    /// policy is tightened by the request weight (unless already at the
    /// floor), and `lasterror` is stamped with a future cool-down marker so
    /// every other client sees a changed epoch and reloads the policy.
    pub(crate) async fn report_rate_limit_hit(
        &self,
        policy: &mut RatePolicy,
        weight: i64,
        wait: i64,
    ) -> Result<()> {
        let tightened = policy.tighten(weight);
        let last_error = unix_time_ms() + wait + policy.time_period_secs() * 1000;

        let mut conn = self.pool.get_connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hincr(&self.status_key, FIELD_REQUESTS, weight)
            .hincr(&self.status_key, FIELD_PENDING_REQUESTS, -weight);

        if tightened {
            pipe.hset_multiple(&self.config_key, &policy_fields(policy));
        }
        pipe.hset(&self.status_key, FIELD_LAST_ERROR, last_error);

        conn.exec_atomic(&pipe).await?;
        warn!(
            host = policy.host(),
            limit = policy.request_limit(),
            tightened,
            cool_down_until = last_error,
            "upstream ratelimit hit recorded"
        );
        Ok(())
    }

    async fn read_status(&self, conn: &mut RedisConnection) -> Result<Option<RequestsStatus>> {
        let fields = conn.hash_get_all(&self.status_key).await?;
        if fields.len() < STATUS_FIELD_COUNT {
            // absent or partially written key: leave the cache as is
            return Ok(None);
        }

        match (
            parse_field(&fields, FIELD_REQUESTS),
            parse_field(&fields, FIELD_PENDING_REQUESTS),
            parse_field(&fields, FIELD_FIRST_REQUEST),
            parse_field(&fields, FIELD_LAST_ERROR),
        ) {
            (Some(requests), Some(pending), Some(first), Some(last_error)) => Ok(Some(
                RequestsStatus::new(requests, pending, first, last_error),
            )),
            _ => Ok(None),
        }
    }

    async fn read_policy(&self, conn: &mut RedisConnection) -> Result<Option<(i64, i64, i64)>> {
        let fields = conn.hash_get_all(&self.config_key).await?;
        if fields.len() < CONFIG_FIELD_COUNT {
            return Ok(None);
        }

        match (
            parse_field(&fields, FIELD_LIMIT),
            parse_field(&fields, FIELD_TIME_PERIOD),
            parse_field(&fields, FIELD_TIME_BETWEEN),
        ) {
            (Some(limit), Some(period), Some(time_between)) => {
                Ok(Some((limit, period, time_between)))
            }
            _ => Ok(None),
        }
    }
}

// key convention: struct:host, e.g. status:com.binance.api
fn status_key(host: &str) -> String {
    format!("status:{host}")
}

fn config_key(host: &str) -> String {
    format!("config:{host}")
}

/// A stored value that is missing or unparseable marks the whole key as
/// uninitialised; the caller falls back to its cached copy.
fn parse_field(fields: &HashMap<String, String>, name: &str) -> Option<i64> {
    fields.get(name).and_then(|value| value.parse::<i64>().ok())
}

fn policy_fields(policy: &RatePolicy) -> [(&'static str, String); CONFIG_FIELD_COUNT] {
    [
        (FIELD_LIMIT, policy.request_limit().to_string()),
        (FIELD_TIME_PERIOD, policy.time_period_secs().to_string()),
        (
            FIELD_TIME_BETWEEN,
            policy.time_between_requests_ms().to_string(),
        ),
    ]
}
