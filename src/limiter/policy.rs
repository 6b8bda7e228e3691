//! Effective rate policy
//!
//! An upstream quota is usually published as two rates: a sustained rate
//! ("1200 requests per 60 seconds") and a burst rate ("20 requests per
//! second"). The reducer folds both into the single slower effective rate,
//! in lowest terms, plus the minimum spacing between admitted requests.

use tracing::debug;

/// The effective rate limit for one upstream host.
///
/// All limiters coordinating on the same budget must be built with the same
/// host name; the host names the Redis keys the limiters share. A policy
/// only ever tightens during a session (see
/// [`RateLimiter::hit_rate_limit`](crate::RateLimiter::hit_rate_limit));
/// it never widens back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePolicy {
    pub(crate) host: String,
    /// Maximum weighted requests per window; 0 means no limit at all
    pub(crate) request_limit: i64,
    /// Window length in seconds
    pub(crate) time_period: i64,
    /// Minimum spacing between admitted requests, in milliseconds
    pub(crate) time_between_requests: i64,
}

impl RatePolicy {
    /// Reduce a sustained and a burst rate to the effective policy.
    ///
    /// Time periods are in seconds, so
    /// `RatePolicy::new("api.example.com", 1200, 60, 20, 1)` describes a
    /// sustained ratelimit of 1200 requests per 60 seconds and a burst
    /// ratelimit of 20 requests per second. A rate with a zero limit or a
    /// zero period is unconstrained; if both rates are unconstrained the
    /// policy admits everything.
    pub fn new(
        host: impl Into<String>,
        sustained_limit: i64,
        sustained_period_secs: i64,
        burst_limit: i64,
        burst_period_secs: i64,
    ) -> Self {
        let (request_limit, time_period) = determine_lower_rate(
            sustained_limit,
            sustained_period_secs,
            burst_limit,
            burst_period_secs,
        );

        let mut policy = Self {
            host: host.into(),
            request_limit,
            time_period,
            time_between_requests: 0,
        };
        policy.recompute_spacing();

        debug!(
            host = %policy.host,
            limit = policy.request_limit,
            period_secs = policy.time_period,
            spacing_ms = policy.time_between_requests,
            "reduced rate policy"
        );
        policy
    }

    /// Upstream host this policy applies to
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Maximum weighted requests per window (0 = unlimited)
    pub fn request_limit(&self) -> i64 {
        self.request_limit
    }

    /// Window length in seconds
    pub fn time_period_secs(&self) -> i64 {
        self.time_period
    }

    /// Minimum spacing between admitted requests, in milliseconds
    pub fn time_between_requests_ms(&self) -> i64 {
        self.time_between_requests
    }

    /// Derive the spacing from the current (limit, period) pair
    pub(crate) fn recompute_spacing(&mut self) {
        if self.request_limit == 0 {
            self.time_between_requests = 0;
            return;
        }
        self.time_between_requests = self.time_period * 1000 / self.request_limit;
    }

    /// Lower the request limit after an observed ratelimit hit.
    ///
    /// Returns whether the policy actually changed; at the floor (a
    /// reduction that would leave no budget) the limit stays put.
    pub(crate) fn tighten(&mut self, weight: i64) -> bool {
        if self.request_limit - weight > 0 {
            self.request_limit -= weight;
            self.recompute_spacing();
            true
        } else {
            false
        }
    }

    /// Replace the numeric triple with the values read from the store,
    /// keeping the host name.
    pub(crate) fn apply_store_fields(&mut self, limit: i64, period: i64, time_between: i64) {
        self.request_limit = limit;
        self.time_period = period;
        self.time_between_requests = time_between;
    }
}

/// Pick the slower of the two declared rates and reduce it to lowest terms.
fn determine_lower_rate(
    sustained_limit: i64,
    sustained_period: i64,
    burst_limit: i64,
    burst_period: i64,
) -> (i64, i64) {
    let sustained_unconstrained = sustained_limit == 0 || sustained_period == 0;
    let burst_unconstrained = burst_limit == 0 || burst_period == 0;

    if sustained_unconstrained && burst_unconstrained {
        return (0, 0);
    }
    if sustained_unconstrained {
        return reduce_fraction(burst_limit, burst_period);
    }
    if burst_unconstrained {
        return reduce_fraction(sustained_limit, sustained_period);
    }

    // Cross-multiply to compare limit/period without integer division.
    // A strictly greater product means sustained admits fewer requests per
    // unit time; ties go to burst.
    if burst_limit * sustained_period > sustained_limit * burst_period {
        reduce_fraction(sustained_limit, sustained_period)
    } else {
        reduce_fraction(burst_limit, burst_period)
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let mut a = a;
    let mut b = b;
    let mut c = a % b;

    while c > 0 {
        a = b;
        b = c;
        c = a % b;
    }
    b
}

fn reduce_fraction(numerator: i64, denominator: i64) -> (i64, i64) {
    let gcd = gcd(numerator, denominator);
    (numerator / gcd, denominator / gcd)
}
