//! Wall-clock helpers.

use chrono::{SecondsFormat, Utc};

/// Current time as an RFC 3339 string with millisecond precision
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Milliseconds since the Unix epoch, for envelope timestamps
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
