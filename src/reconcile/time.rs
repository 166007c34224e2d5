//! Transport-to-display time conversion.

use chrono::{DateTime, FixedOffset, Utc};

/// Convert a UTC transport timestamp into the configured display zone.
pub fn to_local(timeout_at: DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    timeout_at.with_timezone(&offset)
}

/// Long-time rendering used by the timeout list.
pub fn display_time(local: &DateTime<FixedOffset>) -> String {
    local.format("%H:%M:%S").to_string()
}
