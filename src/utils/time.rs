//! Timestamp formatting for chunk names and default prefixes

use chrono::{DateTime, Utc};

/// Format a timestamp for use in file and directory names.
///
/// Filesystem-safe, lexicographically ordered, millisecond precision so
/// chunk names stay strictly increasing at sub-minute rotation intervals.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d_%H-%M-%S%.3f").to_string()
}
