//! Clock helpers

use chrono::{DateTime, TimeZone, Timelike};

/// Get current Unix timestamp in milliseconds
pub fn current_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Format a wall-clock time as zero-padded 24h `HH:MM:SS`
pub fn clock_hms<Tz: TimeZone>(time: &DateTime<Tz>) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        time.hour(),
        time.minute(),
        time.second()
    )
}
