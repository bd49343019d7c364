//! Simple time helpers used by multiple services.

use std::time::Instant;

use chrono::Utc;

/// Current timestamp in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Milliseconds elapsed since `start`.
pub fn elapsed_ms(start: Instant) -> u128 {
    start.elapsed().as_millis()
}
