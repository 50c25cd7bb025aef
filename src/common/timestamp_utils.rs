use chrono::{DateTime, Local, Utc};
use std::fmt::Write;

const FALLBACK_FORMAT: &str = "%Y%m%d_%H%M%S";

// Current local time formatted for filenames. Invalid strftime strings fall back to FALLBACK_FORMAT.
pub fn current_local_timestamp_str(format_str: &str) -> String {
    let now: DateTime<Local> = Local::now();
    let mut out = String::new();
    if write!(out, "{}", now.format(format_str)).is_err() {
        log::warn!("Invalid timestamp format '{}', using '{}'.", format_str, FALLBACK_FORMAT);
        out.clear();
        let _ = write!(out, "{}", now.format(FALLBACK_FORMAT));
    }
    out
}

/// Milliseconds between two capture timestamps, negative when `later` is earlier.
pub fn millis_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    (later - earlier).num_milliseconds()
}
