//! Elapsed session time formatting.

use chrono::{DateTime, Duration, Utc};

const SECS_PER_MINUTE: i64 = 60;
const SECS_PER_HOUR: i64 = 3_600;
const SECS_PER_DAY: i64 = 86_400;

/// Formats an elapsed duration in tiers.
///
/// Returns format like "45s", "12m", "2h 5m", "3d 4h". Negative durations
/// (clock skew, a start time in the future) format as "0s".
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    if secs < SECS_PER_MINUTE {
        format!("{secs}s")
    } else if secs < SECS_PER_HOUR {
        format!("{}m", secs / SECS_PER_MINUTE)
    } else if secs < SECS_PER_DAY {
        let hours = secs / SECS_PER_HOUR;
        let mins = (secs % SECS_PER_HOUR) / SECS_PER_MINUTE;
        format!("{hours}h {mins}m")
    } else {
        let days = secs / SECS_PER_DAY;
        let hours = (secs % SECS_PER_DAY) / SECS_PER_HOUR;
        format!("{days}d {hours}h")
    }
}

/// Formats the time elapsed between `start` and `now`; "0s" when unset.
pub fn format_since(start: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match start {
        Some(start) => format_elapsed(now.signed_duration_since(start)),
        None => "0s".to_string(),
    }
}
