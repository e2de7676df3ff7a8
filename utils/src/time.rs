//! Time formatting helpers.

use tally_types::Timestamp;

/// Format a duration in seconds to a human-readable string.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Describe `at` relative to `now`: `"in 1h 0m"`, `"5m 0s ago"` or `"now"`.
pub fn format_relative(now: Timestamp, at: Timestamp) -> String {
    if at > now {
        format!("in {}", format_duration(now.elapsed_since(at)))
    } else if at < now {
        format!("{} ago", format_duration(at.elapsed_since(now)))
    } else {
        "now".to_string()
    }
}
