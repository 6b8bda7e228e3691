//! Wall-clock helpers

use chrono::Utc;

/// Current UTC wall-clock time in milliseconds since the Unix epoch.
///
/// All window timestamps stored in Redis use this clock. Clients sharing a
/// budget tolerate skew on the order of one spacing interval; the aggregate
/// window bound holds regardless because the counters themselves are shared.
pub fn unix_time_ms() -> i64 {
    Utc::now().timestamp_millis()
}
