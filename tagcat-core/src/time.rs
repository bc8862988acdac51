//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a day count to a chrono duration
pub fn days(count: i64) -> chrono::Duration {
    chrono::Duration::days(count)
}
