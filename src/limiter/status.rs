//! Shared window counters and the admission algorithm
//!
//! `RequestsStatus` is the small record every client replicates through the
//! store: how much of the window is spent, how much is admitted but not yet
//! reported, when the window began, and when a ratelimit hit was last
//! observed. The admission decision itself is a pure function of a status,
//! a policy, a clock reading, and a request weight, so it is tested without
//! any store.

use super::policy::RatePolicy;

/// Snapshot of the cumulative requests made against one host's budget.
///
/// The request weight of any request is how much it counts against the
/// ratelimit; in most cases the weight is one. `last_error_time` doubles as
/// a version epoch for the policy: clients reload the policy from the store
/// only when this value changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestsStatus {
    /// Weighted count of completed requests in the current window
    requests: i64,
    /// Weighted count of requests admitted but not yet reported
    pending_requests: i64,
    /// Millisecond timestamp of the window start (0 = no window yet)
    first_request: i64,
    /// Millisecond timestamp of the last known ratelimit hit
    last_error_time: i64,
}

impl RequestsStatus {
    pub(crate) fn new(
        requests: i64,
        pending_requests: i64,
        first_request: i64,
        last_error_time: i64,
    ) -> Self {
        Self {
            requests,
            pending_requests,
            first_request,
            last_error_time,
        }
    }

    /// Weighted count of completed requests in the current window
    pub fn requests(&self) -> i64 {
        self.requests
    }

    /// Weighted count of admitted requests whose outcome is unreported
    pub fn pending_requests(&self) -> i64 {
        self.pending_requests
    }

    /// Millisecond timestamp of the window start (0 = no window yet)
    pub fn first_request(&self) -> i64 {
        self.first_request
    }

    /// Millisecond timestamp of the last known ratelimit hit
    pub fn last_error_time(&self) -> i64 {
        self.last_error_time
    }

    /// Decide whether a request of the given weight may be admitted at
    /// `now`.
    ///
    /// Returns `(true, 0)` and counts the weight as pending when the
    /// request may proceed, or `(false, wait_ms)` with the number of
    /// milliseconds to sleep before asking again. The mutation is local to
    /// this copy; the coordinator only persists it when the surrounding
    /// optimistic transaction commits.
    pub(crate) fn admission_decision(
        &mut self,
        weight: i64,
        policy: &RatePolicy,
        now: i64,
    ) -> (bool, i64) {
        if policy.request_limit == 0 {
            // unconstrained policy, nothing to count
            return (true, 0);
        }

        if self.is_in_period(now, policy) {
            if self.will_hit_limit(weight, policy) {
                return (false, self.time_until_end_of_period(now, policy));
            }

            let next_eligible = self.next_eligible(policy);
            if now < next_eligible {
                return (false, next_eligible - now);
            }

            self.pending_requests += weight;
            return (true, 0);
        }

        // The window has elapsed (or never started): start a fresh one.
        // Spacing still applies against any requests pending from the old
        // window, so a fresh window cannot bunch up behind them.
        self.requests = 0;
        self.first_request = now;

        let next_eligible = self.next_eligible(policy);
        if now < next_eligible {
            return (false, next_eligible - now);
        }

        self.pending_requests += weight;
        (true, 0)
    }

    /// Whether `now` falls inside the current window.
    ///
    /// The window is half-open: a reading exactly one period after
    /// `first_request` is already outside it.
    fn is_in_period(&self, now: i64, policy: &RatePolicy) -> bool {
        if self.first_request == 0 {
            return false;
        }
        let elapsed = now - self.first_request;
        elapsed >= 0 && elapsed < policy.time_period * 1000
    }

    /// Whether admitting `weight` would push the window total over the
    /// limit. Pending requests count: they are budget already promised.
    fn will_hit_limit(&self, weight: i64, policy: &RatePolicy) -> bool {
        self.requests + self.pending_requests + weight > policy.request_limit
    }

    /// Earliest timestamp at which the next request keeps the admitted
    /// stream spaced by `time_between_requests`.
    fn next_eligible(&self, policy: &RatePolicy) -> i64 {
        self.first_request
            + (self.requests + self.pending_requests) * policy.time_between_requests
    }

    fn time_until_end_of_period(&self, now: i64, policy: &RatePolicy) -> i64 {
        self.first_request + policy.time_period * 1000 - now
    }
}
